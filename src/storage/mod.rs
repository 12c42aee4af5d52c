pub mod directory;
pub mod memory;
pub mod persistence;
pub mod traits;

pub use directory::{DirectoryStore, ILLEGAL_NAME_CHARS, validate_entity_id};
pub use memory::MemoryStore;
pub use persistence::{SnapshotFile, decode_snapshot, encode_snapshot};
pub use traits::EntityStore;
