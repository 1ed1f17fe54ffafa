// Line grammar for manifest.txt.
//
//   # sheet.png cols=16 rows=16
//   89ABCDEF col=0 row=1 plane=BG1 palette=003 scale=4 group=2 ; note

/// Highest `version=` this reader understands.
pub const SUPPORTED_VERSION: u32 = 1;
/// Grid used when a header omits `cols=`/`rows=`.
pub const DEFAULT_GRID: u32 = 16;

/// Pixel rectangle inside a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHeader {
    pub file: String,
    pub cols: u32,
    pub rows: u32,
}

/// Fields of one mapping line, before it is bound to a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    pub hash: u32,
    pub tile_index: Option<u16>,
    pub col: Option<u32>,
    pub row: Option<u32>,
    pub rect: Option<CellRect>,
    pub plane: Option<String>,
    pub palette: Option<u16>,
    pub scale: Option<u32>,
    pub group: Option<u32>,
    pub version: u32,
    pub note: Option<String>,
    pub unknown_tokens: usize,
}

impl Mapping {
    pub fn cell(&self) -> Option<(u32, u32)> {
        Some((self.col?, self.row?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    Blank,
    Comment,
    Header(SheetHeader),
    Mapping(Mapping),
    /// Parsed, but written for a newer reader.
    Unsupported { hash: u32, version: u32 },
    Malformed(String),
}

/// Decimal, or hex with a `0x` prefix.
pub fn parse_number(value: &str) -> Option<u32> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        return u32::from_str_radix(hex, 16).ok();
    }
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<u32>().ok()
}

fn parse_hash(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 8 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(token, 16).ok()
}

/// Split off a `;` note. Returns (content, note).
fn split_note(line: &str) -> (&str, Option<String>) {
    match line.find(';') {
        Some(pos) => {
            let note = line[pos + 1..].trim();
            let note = if note.is_empty() { None } else { Some(note.to_string()) };
            (&line[..pos], note)
        }
        None => (line, None),
    }
}

fn parse_header(rest: &str) -> ManifestLine {
    let mut tokens = rest.split_whitespace();
    let file = match tokens.next() {
        Some(f) if f.contains('.') => f,
        _ => return ManifestLine::Comment,
    };
    let mut header = SheetHeader {
        file: file.to_string(),
        cols: DEFAULT_GRID,
        rows: DEFAULT_GRID,
    };
    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let target = match key {
            "cols" => &mut header.cols,
            "rows" => &mut header.rows,
            _ => continue,
        };
        match parse_number(value) {
            Some(v) if v > 0 => *target = v,
            _ => log::debug!("manifest: ignoring bad header value {}", token),
        }
    }
    ManifestLine::Header(header)
}

// Ok(false) for a key this reader does not know.
fn apply_field(m: &mut Mapping, rect: &mut [Option<u32>; 4], key: &str, value: &str) -> Result<bool, ()> {
    let number = || parse_number(value).ok_or(());
    match key {
        "col" => m.col = Some(number()?),
        "row" => m.row = Some(number()?),
        "x" => rect[0] = Some(number()?),
        "y" => rect[1] = Some(number()?),
        "w" | "width" => rect[2] = Some(number()?),
        "h" | "height" => rect[3] = Some(number()?),
        "scale" => m.scale = Some(number()?).filter(|&s| s > 0),
        "group" => m.group = Some(number()?),
        "version" => m.version = number()?,
        "palette" => m.palette = Some(u16::try_from(number()?).map_err(|_| ())?),
        "tile" | "index" => m.tile_index = Some(u16::try_from(number()?).map_err(|_| ())?),
        "plane" => {
            if value.is_empty() {
                return Err(());
            }
            m.plane = Some(value.to_string());
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_mapping(content: &str, note: Option<String>) -> ManifestLine {
    let mut tokens = content.split_whitespace();
    let first = tokens.next().unwrap_or("");
    let Some(hash) = parse_hash(first) else {
        return ManifestLine::Malformed(format!("bad hash '{}'", first));
    };

    let mut m = Mapping {
        hash,
        version: SUPPORTED_VERSION,
        note,
        ..Mapping::default()
    };
    // x, y, w, h
    let mut rect = [None; 4];

    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            m.unknown_tokens += 1;
            continue;
        };
        match apply_field(&mut m, &mut rect, key, value) {
            Ok(true) => {}
            Ok(false) => m.unknown_tokens += 1,
            Err(()) => return ManifestLine::Malformed(format!("bad value in '{}'", token)),
        }
    }

    if let [Some(x), Some(y), Some(w), Some(h)] = rect {
        if w > 0 && h > 0 {
            m.rect = Some(CellRect { x, y, w, h });
        }
    }

    if m.version > SUPPORTED_VERSION {
        return ManifestLine::Unsupported { hash, version: m.version };
    }
    if m.rect.is_none() && m.cell().is_none() {
        return ManifestLine::Malformed(format!("{:08X} has no col/row or x/y/w/h", hash));
    }
    ManifestLine::Mapping(m)
}

/// Classify one line. `line` may still carry a trailing CR.
pub fn parse_line(line: &str) -> ManifestLine {
    let line = line.trim_end_matches('\r');
    let (content, note) = split_note(line);
    let content = content.trim();
    if content.is_empty() {
        return if note.is_some() { ManifestLine::Comment } else { ManifestLine::Blank };
    }
    if let Some(rest) = content.strip_prefix('#') {
        return parse_header(rest);
    }
    parse_mapping(content, note)
}
