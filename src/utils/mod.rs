pub mod archive;
pub mod artifact;
pub mod locker;
pub mod sql;

pub use archive::{compress_backup, decompress_backup};
pub use artifact::{find_latest_backup, list_backups};
pub use locker::TargetLock;
