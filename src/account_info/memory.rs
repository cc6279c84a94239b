//! In-memory account info store.
//!
//! Keeps all state in memory with no persistence. Useful for tests and
//! short-lived tools. A single `Mutex` serializes every operation.

use std::sync::Mutex;

use super::state::{AccountState, StateStore};
use crate::errors::Result;

#[derive(Debug, Default)]
pub struct MemoryAccountInfo {
    inner: Mutex<AccountState>,
}

impl MemoryAccountInfo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryAccountInfo {
    fn read<T>(&self, f: impl FnOnce(&AccountState) -> T) -> Result<T> {
        let inner = self.inner.lock().expect("mutex poisoned");
        Ok(f(&inner))
    }

    fn update<T>(&self, f: impl FnOnce(&mut AccountState) -> T) -> Result<T> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        Ok(f(&mut inner))
    }
}
