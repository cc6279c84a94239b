//! Local JSON file account info store.
//!
//! The whole state lives in one JSON document.  Every operation is a
//! read (or read-modify-write) of that document under an advisory file
//! lock held on a sibling `<path>.lock` file via the `fs2` crate, so
//! several processes can share the same file.  Writes go through a
//! temporary file that is atomically renamed over the document.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use super::state::{AccountState, StateStore};
use crate::errors::{AccountInfoError, Result};

/// Current document version. Bumped when the layout changes.
const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    #[serde(flatten)]
    state: AccountState,
}

pub struct LocalAccountInfo {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes this handle's own threads; the file lock covers other handles.
    guard: RwLock<()>,
}

impl LocalAccountInfo {
    /// Use the document at `path`, creating parent directories as needed.
    /// The document itself is created on the first write.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = parent_dir(&path).to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        info!("Local account info store at {}", path.display());
        Ok(Self {
            path,
            lock_path: PathBuf::from(lock_path),
            guard: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock_file(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        Ok(file)
    }

    fn load(&self) -> Result<AccountState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AccountState::default())
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(AccountState::default());
        }
        let document: Document = serde_json::from_slice(&bytes)?;
        if document.version != DOCUMENT_VERSION {
            return Err(AccountInfoError::UnsupportedVersion {
                version: document.version,
            });
        }
        Ok(document.state)
    }

    fn save(&self, state: AccountState) -> Result<()> {
        // NamedTempFile is created with owner-only permissions, which the
        // renamed document keeps.
        let temp = NamedTempFile::new_in(parent_dir(&self.path))?;
        {
            let mut writer = BufWriter::new(&temp);
            let document = Document {
                version: DOCUMENT_VERSION,
                state,
            };
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writeln!(writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path)?;
        Ok(())
    }
}

impl StateStore for LocalAccountInfo {
    fn read<T>(&self, f: impl FnOnce(&AccountState) -> T) -> Result<T> {
        let _guard = self.guard.read().expect("rwlock poisoned");
        let lock = self.open_lock_file()?;
        FileExt::lock_shared(&lock)?;
        let state = self.load();
        FileExt::unlock(&lock)?;
        Ok(f(&state?))
    }

    fn update<T>(&self, f: impl FnOnce(&mut AccountState) -> T) -> Result<T> {
        let _guard = self.guard.write().expect("rwlock poisoned");
        let lock = self.open_lock_file()?;
        FileExt::lock_exclusive(&lock)?;
        let result = self.load().and_then(|mut state| {
            let out = f(&mut state);
            self.save(state)?;
            Ok(out)
        });
        FileExt::unlock(&lock)?;
        result
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
