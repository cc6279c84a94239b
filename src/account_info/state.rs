//! In-process representation of the account info state.
//!
//! [`AccountState`] is what the memory backend keeps under its mutex and
//! what the local backend serializes to its JSON document.  The SQLite
//! backend keeps the same shape in tables instead.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::store::{
    check_allowed, check_session, AccountInfo, Allowed, Bucket, Session, UploadUrl,
};
use crate::errors::{AccountInfoError, Result};
use crate::metrics;

/// Which upload URL pool an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Pools keyed by bucket id.
    Bucket,
    /// Pools keyed by large file id.
    LargeFile,
}

impl PoolKind {
    /// Label used in logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            PoolKind::Bucket => "bucket",
            PoolKind::LargeFile => "large_file",
        }
    }
}

// ── Bucket name cache ──────────────────────────────────────────────

/// One-to-one mapping between bucket names and bucket ids.
///
/// Persisted as a plain `name -> id` map; the reverse index is rebuilt on
/// load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct BucketNameCache {
    name_to_id: HashMap<String, String>,
    id_to_name: HashMap<String, String>,
}

impl BucketNameCache {
    /// Build a cache from `(name, id)` pairs; later pairs win.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut cache = BucketNameCache::default();
        for (name, id) in pairs {
            cache.save(&Bucket::new(name.as_str(), id.as_str()));
        }
        cache
    }

    /// Upsert one mapping, dropping whatever conflicted with it.
    pub fn save(&mut self, bucket: &Bucket) {
        if let Some(old_id) = self.name_to_id.remove(&bucket.name) {
            self.id_to_name.remove(&old_id);
        }
        if let Some(old_name) = self.id_to_name.remove(&bucket.id) {
            self.name_to_id.remove(&old_name);
        }
        self.name_to_id
            .insert(bucket.name.clone(), bucket.id.clone());
        self.id_to_name
            .insert(bucket.id.clone(), bucket.name.clone());
    }

    pub fn remove_name(&mut self, name: &str) {
        if let Some(id) = self.name_to_id.remove(name) {
            self.id_to_name.remove(&id);
        }
    }

    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.id_to_name.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

impl From<BTreeMap<String, String>> for BucketNameCache {
    fn from(map: BTreeMap<String, String>) -> Self {
        let pairs: Vec<(String, String)> = map.into_iter().collect();
        BucketNameCache::from_pairs(&pairs)
    }
}

impl From<BucketNameCache> for BTreeMap<String, String> {
    fn from(cache: BucketNameCache) -> Self {
        cache.name_to_id.into_iter().collect()
    }
}

// ── Upload URL pool ────────────────────────────────────────────────

/// Upload URLs grouped by key (bucket id or large file id).
///
/// Pairs are taken most-recently-put first. Empty entries are removed so
/// the persisted form only lists keys that still have URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadUrlPool {
    urls: BTreeMap<String, Vec<UploadUrl>>,
}

impl UploadUrlPool {
    pub fn put(&mut self, key: &str, url: UploadUrl) {
        self.urls.entry(key.to_string()).or_default().push(url);
    }

    pub fn take(&mut self, key: &str) -> Option<UploadUrl> {
        let urls = self.urls.get_mut(key)?;
        let taken = urls.pop();
        if urls.is_empty() {
            self.urls.remove(key);
        }
        taken
    }

    /// Drop every URL for `key`, returning how many were dropped.
    pub fn clear_key(&mut self, key: &str) -> usize {
        self.urls.remove(key).map_or(0, |urls| urls.len())
    }

    pub fn count(&self, key: &str) -> usize {
        self.urls.get(key).map_or(0, Vec::len)
    }
}

// ── Whole state ────────────────────────────────────────────────────

/// Everything an account info store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub allowed: Option<Allowed>,
    #[serde(default)]
    pub buckets: BucketNameCache,
    #[serde(default)]
    pub bucket_upload_urls: UploadUrlPool,
    #[serde(default)]
    pub large_file_upload_urls: UploadUrlPool,
}

impl AccountState {
    pub fn pool(&self, kind: PoolKind) -> &UploadUrlPool {
        match kind {
            PoolKind::Bucket => &self.bucket_upload_urls,
            PoolKind::LargeFile => &self.large_file_upload_urls,
        }
    }

    pub fn pool_mut(&mut self, kind: PoolKind) -> &mut UploadUrlPool {
        match kind {
            PoolKind::Bucket => &mut self.bucket_upload_urls,
            PoolKind::LargeFile => &mut self.large_file_upload_urls,
        }
    }

    /// Reset to the empty state.
    pub fn clear(&mut self) {
        *self = AccountState::default();
    }
}

// ── Backends built on AccountState ─────────────────────────────────

/// A backend that keeps the whole [`AccountState`] behind one lock.
///
/// `read` and `update` must each run their closure while holding the lock
/// for the logical store; `update` must make the mutation durable before
/// releasing it.
pub trait StateStore: Send + Sync {
    fn read<T>(&self, f: impl FnOnce(&AccountState) -> T) -> Result<T>;

    fn update<T>(&self, f: impl FnOnce(&mut AccountState) -> T) -> Result<T>;
}

fn take_url<S: StateStore>(store: &S, kind: PoolKind, key: &str) -> Result<Option<UploadUrl>> {
    let taken = store.update(|state| state.pool_mut(kind).take(key))?;
    metrics::record_take(kind, taken.is_some());
    debug!(
        "Take {} upload URL for {}: {}",
        kind.label(),
        key,
        if taken.is_some() { "hit" } else { "miss" }
    );
    Ok(taken)
}

fn put_url<S: StateStore>(
    store: &S,
    kind: PoolKind,
    key: &str,
    upload_url: &str,
    upload_auth_token: &str,
) -> Result<()> {
    let url = UploadUrl::new(upload_url, upload_auth_token);
    store.update(|state| state.pool_mut(kind).put(key, url))?;
    metrics::record_put(kind);
    debug!("Put {} upload URL for {}", kind.label(), key);
    Ok(())
}

fn clear_urls<S: StateStore>(store: &S, kind: PoolKind, key: &str) -> Result<()> {
    let dropped = store.update(|state| state.pool_mut(kind).clear_key(key))?;
    debug!("Cleared {} {} upload URLs for {}", dropped, kind.label(), key);
    Ok(())
}

impl<S: StateStore> AccountInfo for S {
    fn clear(&self) -> Result<()> {
        self.update(AccountState::clear)?;
        info!("Account info cleared");
        Ok(())
    }

    fn set_auth_data(&self, session: Session, allowed: Option<Allowed>) -> Result<()> {
        check_allowed(allowed.as_ref())?;
        check_session(&session)?;
        let account_id = session.account_id.clone();
        let realm = session.realm.clone();
        self.update(|state| {
            state.session = Some(session);
            state.allowed = allowed;
        })?;
        info!("Stored auth data for account {} in realm {}", account_id, realm);
        Ok(())
    }

    fn get_session(&self) -> Result<Session> {
        self.read(|state| state.session.clone())?
            .ok_or(AccountInfoError::MissingAccountData)
    }

    fn get_allowed(&self) -> Result<Option<Allowed>> {
        self.read(|state| {
            state
                .session
                .as_ref()
                .map(|_| state.allowed.clone())
                .ok_or(AccountInfoError::MissingAccountData)
        })?
    }

    fn refresh_entire_bucket_name_cache(&self, name_id_pairs: &[(String, String)]) -> Result<()> {
        let cache = BucketNameCache::from_pairs(name_id_pairs);
        let count = cache.len();
        self.update(|state| state.buckets = cache)?;
        debug!("Bucket name cache refreshed with {} entries", count);
        Ok(())
    }

    fn save_bucket(&self, bucket: &Bucket) -> Result<()> {
        self.update(|state| state.buckets.save(bucket))?;
        debug!("Saved bucket {} -> {}", bucket.name, bucket.id);
        Ok(())
    }

    fn remove_bucket_name(&self, bucket_name: &str) -> Result<()> {
        self.update(|state| state.buckets.remove_name(bucket_name))?;
        debug!("Removed bucket name {}", bucket_name);
        Ok(())
    }

    fn get_bucket_id_or_none_from_bucket_name(&self, bucket_name: &str) -> Result<Option<String>> {
        self.read(|state| state.buckets.id_for(bucket_name).map(str::to_string))
    }

    fn get_bucket_name_or_none_from_bucket_id(&self, bucket_id: &str) -> Result<Option<String>> {
        self.read(|state| state.buckets.name_for(bucket_id).map(str::to_string))
    }

    fn take_bucket_upload_url(&self, bucket_id: &str) -> Result<Option<UploadUrl>> {
        take_url(self, PoolKind::Bucket, bucket_id)
    }

    fn put_bucket_upload_url(
        &self,
        bucket_id: &str,
        upload_url: &str,
        upload_auth_token: &str,
    ) -> Result<()> {
        put_url(self, PoolKind::Bucket, bucket_id, upload_url, upload_auth_token)
    }

    fn clear_bucket_upload_data(&self, bucket_id: &str) -> Result<()> {
        clear_urls(self, PoolKind::Bucket, bucket_id)
    }

    fn put_large_file_upload_url(
        &self,
        file_id: &str,
        upload_url: &str,
        upload_auth_token: &str,
    ) -> Result<()> {
        put_url(self, PoolKind::LargeFile, file_id, upload_url, upload_auth_token)
    }

    fn take_large_file_upload_url(&self, file_id: &str) -> Result<Option<UploadUrl>> {
        take_url(self, PoolKind::LargeFile, file_id)
    }

    fn clear_large_file_upload_urls(&self, file_id: &str) -> Result<()> {
        clear_urls(self, PoolKind::LargeFile, file_id)
    }
}
