//! Preset persistence for Negalab
//!
//! Stores named conversion presets in a single local SQLite database. A
//! record named `"Default"` is seeded at initialization and at most one
//! record is marked as the selected preset.

mod error;
mod storage;

pub use error::{PresetStoreError, Result};
pub use storage::{DB_FILE, PresetStore};
