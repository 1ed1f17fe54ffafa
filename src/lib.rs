//! HD tile packs for SNES emulation: identify tiles as the host resolves
//! them, dump first-seen tiles to sheets, and serve replacement art from
//! authored packs under per-frame budgets.

pub mod budget;
pub mod codec;
pub mod config;
pub mod dump;
pub mod engine;
pub mod host;
pub mod manifest;
pub mod replace;
pub mod snapshot;
pub mod tile;

pub use config::HdConfig;
pub use engine::{game_name, ContentPaths, HdEngine, HdFeatures, TileStatus};
pub use manifest::{LoadStatus, ManifestStore};
pub use snapshot::PpuSnapshot;
pub use tile::{TileIdentity, TileKind, TilePixels};
