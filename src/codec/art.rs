use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Where authored replacement art comes from.
///
/// The replacement cache only ever asks two questions: does an asset exist,
/// and give me its pixels. Keeping that behind a trait lets the cache run
/// against the filesystem in the emulator and against in-memory images in
/// tests and tools.
pub trait ArtStore {
    fn exists(&self, name: &str) -> bool;
    fn load(&self, name: &str) -> Result<RgbaImage, String>;
}

/// Art files under one HD pack directory.
#[derive(Debug, Clone)]
pub struct FsArtStore {
    root: PathBuf,
}

impl FsArtStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtStore for FsArtStore {
    fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    fn load(&self, name: &str) -> Result<RgbaImage, String> {
        let path = self.root.join(name);
        let img = image::open(&path).map_err(|e| format!("Failed to decode {}: {}", path.display(), e))?;
        Ok(img.to_rgba8())
    }
}

/// A store with nothing in it; used while no content is loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArt;

impl ArtStore for NoArt {
    fn exists(&self, _name: &str) -> bool {
        false
    }

    fn load(&self, name: &str) -> Result<RgbaImage, String> {
        Err(format!("No HD pack loaded (requested {})", name))
    }
}
