//! Durable storage of the latest deployment per (repo, root).
//!
//! Records are small JSON files written with the temp-file, fsync, rename,
//! fsync-directory sequence, so a crash leaves either the old or new record.

pub mod fsync;
pub mod store;

pub use fsync::{fsync_dir, fsync_file};
pub use store::{
    FileDeploymentStore, StoreError, load_record, save_record_atomic, try_load_record,
};
