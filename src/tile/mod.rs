pub mod decode;
pub mod hash;

use bitflags::bitflags;
use std::fmt;

pub use decode::{decode_planar, direct_color, DirectColor, PaletteLookup, TilePixels};
pub use hash::{content_hash, content_hash_raw, HashMemo};

bitflags! {
    /// Tilemap/OAM mirror bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TileFlags: u8 {
        const HMIRROR = 0x01;
        const VMIRROR = 0x02;
    }
}

impl TileFlags {
    pub fn from_mirror(hmirror: bool, vmirror: bool) -> Self {
        let mut flags = TileFlags::empty();
        flags.set(TileFlags::HMIRROR, hmirror);
        flags.set(TileFlags::VMIRROR, vmirror);
        flags
    }

    #[inline]
    pub fn hmirror(self) -> bool {
        self.contains(TileFlags::HMIRROR)
    }

    #[inline]
    pub fn vmirror(self) -> bool {
        self.contains(TileFlags::VMIRROR)
    }
}

/// Bit-depth class of a tile's character data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Bpp2,
    Bpp4,
    Bpp8,
}

impl BitDepth {
    /// 0/1/2, as packed into the context key.
    pub fn index(self) -> u8 {
        match self {
            BitDepth::Bpp2 => 0,
            BitDepth::Bpp4 => 1,
            BitDepth::Bpp8 => 2,
        }
    }

    pub fn bits(self) -> u8 {
        2 << self.index()
    }

    /// VRAM words occupied by one 8x8 character.
    pub fn words_per_tile(self) -> u16 {
        4 * self.bits() as u16
    }

    /// Depth of background layer `bg` (0-based) in `mode`; `None` when the
    /// layer does not exist in that mode or is the Mode 7 plane.
    pub fn for_background(mode: u8, bg: u8) -> Option<BitDepth> {
        use BitDepth::*;
        match (mode & 7, bg) {
            (0, 0..=3) => Some(Bpp2),
            (1, 0 | 1) => Some(Bpp4),
            (1, 2) => Some(Bpp2),
            (2, 0 | 1) => Some(Bpp4),
            (3, 0) => Some(Bpp8),
            (3, 1) => Some(Bpp4),
            (4, 0) => Some(Bpp8),
            (4, 1) => Some(Bpp2),
            (5, 0) => Some(Bpp4),
            (5, 1) => Some(Bpp2),
            (6, 0) => Some(Bpp4),
            _ => None,
        }
    }
}

/// What kind of native graphic a tile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Background layer tile; `plane` is 0..=3 for BG1..BG4.
    Background { plane: u8 },
    /// One 8x8 character of an object; `column` is its position within a
    /// multi-tile sprite row.
    Sprite { column: u8 },
    /// The whole affine BG1 plane.
    Mode7,
}

impl TileKind {
    fn tag(self) -> u64 {
        match self {
            TileKind::Background { .. } => 0,
            TileKind::Sprite { .. } => 1,
            TileKind::Mode7 => 2,
        }
    }
}

/// Structural identity of a tile, independent of its resolved pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContextKey(pub u64);

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Pack background tile context into a key.
///
/// Layout, low to high: plane (2 bits), character (10), palette (16),
/// depth index (2), hmirror (1), vmirror (1). Wider kinds add fields above
/// bit 32 in `TileIdentity::context_key`.
pub fn context_key(
    plane: u8,
    tile_index: u16,
    palette: u16,
    depth: BitDepth,
    hmirror: bool,
    vmirror: bool,
) -> ContextKey {
    let mut key = 0u64;
    key |= plane as u64 & 0x3;
    key |= (tile_index as u64 & 0x3FF) << 2;
    key |= (palette as u64) << 12;
    key |= (depth.index() as u64 & 0x3) << 28;
    key |= (hmirror as u64) << 30;
    key |= (vmirror as u64) << 31;
    ContextKey(key)
}

/// Palette base for a background tile: the CGRAM index of its color 0.
pub fn bg_palette_base(mode: u8, bg: u8, group: u8, depth: BitDepth) -> u16 {
    let group = (group & 7) as u16;
    if mode & 7 == 0 {
        return bg as u16 * 32 + group * 4;
    }
    match depth {
        BitDepth::Bpp2 => group << 2,
        BitDepth::Bpp4 => group << 4,
        BitDepth::Bpp8 => 0,
    }
}

/// Whether direct color, when enabled, applies to this background.
pub fn uses_direct_color(mode: u8, bg: u8) -> bool {
    bg == 0 && matches!(mode & 7, 3 | 4 | 7)
}

/// Palette base for an object tile; objects use the upper half of CGRAM.
pub fn sprite_palette_base(group: u8) -> u16 {
    128 + ((group as u16 & 7) << 4)
}

/// Everything the host knows about a tile when it resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIdentity {
    pub kind: TileKind,
    pub character: u16,
    /// Effective palette base (CGRAM index of color 0).
    pub palette: u16,
    pub palette_group: u8,
    pub depth: BitDepth,
    pub flags: TileFlags,
}

impl TileIdentity {
    pub fn background(plane: u8, character: u16, palette: u16, palette_group: u8, depth: BitDepth, flags: TileFlags) -> Self {
        Self {
            kind: TileKind::Background { plane: plane & 3 },
            character: character & 0x3FF,
            palette,
            palette_group: palette_group & 7,
            depth,
            flags,
        }
    }

    /// Objects are always 4bpp; `group` is the OAM palette (0..=7).
    pub fn sprite(column: u8, character: u16, group: u8, flags: TileFlags) -> Self {
        Self {
            kind: TileKind::Sprite { column: column & 0xF },
            character: character & 0x1FF,
            palette: sprite_palette_base(group),
            palette_group: group & 7,
            depth: BitDepth::Bpp4,
            flags,
        }
    }

    pub fn mode7() -> Self {
        Self {
            kind: TileKind::Mode7,
            character: 0,
            palette: 0,
            palette_group: 0,
            depth: BitDepth::Bpp8,
            flags: TileFlags::empty(),
        }
    }

    pub fn plane(&self) -> u8 {
        match self.kind {
            TileKind::Background { plane } => plane,
            TileKind::Sprite { .. } | TileKind::Mode7 => 0,
        }
    }

    pub fn context_key(&self) -> ContextKey {
        let base = context_key(
            self.plane(),
            self.character,
            self.palette,
            self.depth,
            self.flags.hmirror(),
            self.flags.vmirror(),
        );
        let mut key = base.0;
        key |= (self.palette_group as u64 & 0x7) << 32;
        if let TileKind::Sprite { column } = self.kind {
            key |= (column as u64 & 0xF) << 36;
        }
        key |= self.kind.tag() << 60;
        ContextKey(key)
    }

    /// Sheet group the tile is packed into when dumped.
    pub fn sheet_group(&self) -> &'static str {
        match self.kind {
            TileKind::Background { plane } => match plane {
                0 => "BG1",
                1 => "BG2",
                2 => "BG3",
                _ => "BG4",
            },
            TileKind::Sprite { .. } => "SPR",
            TileKind::Mode7 => "MODE7",
        }
    }

    /// File stem for per-identity art, derived from context only.
    pub fn stem(&self) -> String {
        let h = self.flags.hmirror() as u8;
        let v = self.flags.vmirror() as u8;
        match self.kind {
            TileKind::Background { plane } => format!(
                "BG{}_C{:04}_PB{:03}_G{}_B{}_H{}_V{}",
                plane + 1,
                self.character,
                self.palette,
                self.palette_group,
                self.depth.bits(),
                h,
                v
            ),
            TileKind::Sprite { column } => format!(
                "SPR_C{:04}_TX{:02}_PB{:03}_B4_H{}_V{}",
                self.character, column, self.palette, h, v
            ),
            TileKind::Mode7 => "MODE7_BG1".to_string(),
        }
    }
}
