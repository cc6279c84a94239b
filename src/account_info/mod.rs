//! Account info storage layer.
//!
//! The account info store keeps credentials, the bucket name cache, and
//! upload URL pools.  The [`store::AccountInfo`] trait defines the
//! interface; [`sqlite::SqliteAccountInfo`] is the default implementation.

use std::sync::Arc;

use tracing::info;

use crate::config::{expand_home, AccountInfoConfig, BackendKind};

#[cfg(test)]
mod conformance;
pub mod local;
pub mod memory;
pub mod sqlite;
pub mod state;
pub mod store;

pub use store::{
    allowed_is_valid, AccountInfo, Allowed, Bucket, Realm, Session, UploadUrl, MAX_MINIMUM_PART_SIZE,
};

/// Construct the backend selected by `config`.
pub fn open_account_info(config: &AccountInfoConfig) -> anyhow::Result<Arc<dyn AccountInfo>> {
    let store: Arc<dyn AccountInfo> = match config.backend {
        BackendKind::Memory => {
            info!("Using in-memory account info store");
            Arc::new(memory::MemoryAccountInfo::new())
        }
        BackendKind::Local => {
            let path = expand_home(&config.local.path);
            Arc::new(local::LocalAccountInfo::new(&path)?)
        }
        BackendKind::Sqlite => {
            let path = expand_home(&config.sqlite.path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Arc::new(sqlite::SqliteAccountInfo::new(&path)?)
        }
    };
    Ok(store)
}
