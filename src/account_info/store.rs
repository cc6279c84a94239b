//! Abstract account info store trait.
//!
//! Any backend must implement [`AccountInfo`].  Implementations are shared
//! between threads (`Send + Sync`) and, for the durable backends, between
//! processes that open the same file.  Every mutating method must be atomic
//! with respect to every other method on the same logical store.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AccountInfoError, Result};

// ── Realm ──────────────────────────────────────────────────────────

/// Deployment environment of the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Realm {
    Production,
    Dev,
    Staging,
    /// Any other realm, identified by its API URL.
    Custom(String),
}

impl Realm {
    /// API endpoint for this realm.
    pub fn api_url(&self) -> &str {
        match self {
            Realm::Production => "https://api.backblazeb2.com",
            Realm::Dev => "http://api.backblazeb2.xyz:8180",
            Realm::Staging => "https://api.backblaze.net",
            Realm::Custom(url) => url,
        }
    }

    /// Name used when persisting the realm.
    pub fn as_str(&self) -> &str {
        match self {
            Realm::Production => "production",
            Realm::Dev => "dev",
            Realm::Staging => "staging",
            Realm::Custom(url) => url,
        }
    }
}

impl From<&str> for Realm {
    fn from(s: &str) -> Self {
        match s {
            "production" => Realm::Production,
            "dev" => Realm::Dev,
            "staging" => Realm::Staging,
            other => Realm::Custom(other.to_string()),
        }
    }
}

impl From<String> for Realm {
    fn from(s: String) -> Self {
        Realm::from(s.as_str())
    }
}

impl From<Realm> for String {
    fn from(realm: Realm) -> Self {
        realm.as_str().to_string()
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Session types ──────────────────────────────────────────────────

/// Results of account authorization that are kept between API calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Account identifier.
    pub account_id: String,
    /// Account authorization token.
    pub auth_token: String,
    /// Base URL for API calls.
    pub api_url: String,
    /// Base URL for downloads.
    pub download_url: String,
    /// Minimum number of bytes in a part of a large file.
    pub minimum_part_size: u64,
    /// Application key used to authorize.
    pub application_key: String,
    /// Realm the account was authorized against.
    pub realm: Realm,
}

/// Restrictions attached to an authorization token.
///
/// This is the structure returned by account authorization, with the
/// addition of `bucketName` resolved from `bucketId`.  `None` in place of
/// the whole structure means "everything is allowed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowed {
    /// Bucket the key is restricted to, if any.
    #[serde(default)]
    pub bucket_id: Option<String>,
    /// Name of the restricted bucket; present exactly when `bucket_id` is.
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// File name prefix the key is restricted to, if any.
    #[serde(default)]
    pub name_prefix: Option<String>,
    /// Capabilities granted to the key.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

/// A bucket name paired with its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub id: String,
}

impl Bucket {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Bucket {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// A pre-authorized upload endpoint. Each one is handed out at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadUrl {
    pub upload_url: String,
    pub upload_auth_token: String,
}

impl UploadUrl {
    pub fn new(upload_url: impl Into<String>, upload_auth_token: impl Into<String>) -> Self {
        UploadUrl {
            upload_url: upload_url.into(),
            upload_auth_token: upload_auth_token.into(),
        }
    }
}

/// Returns true iff `allowed` is legal: either absent, or carrying a bucket
/// id exactly when it carries a bucket name.
///
/// Only values are compared. A payload that omits the `bucketName` key
/// deserializes to `None` for it, so `{"bucketId": null}` is valid here even
/// though the key itself is missing.
pub fn allowed_is_valid(allowed: Option<&Allowed>) -> bool {
    match allowed {
        None => true,
        Some(a) => a.bucket_id.is_some() == a.bucket_name.is_some(),
    }
}

/// Largest `minimum_part_size` accepted: the range of a SQLite INTEGER.
pub const MAX_MINIMUM_PART_SIZE: u64 = i64::MAX as u64;

/// Reject a session that some backend could not store exactly.
pub(crate) fn check_session(session: &Session) -> Result<()> {
    if session.minimum_part_size > MAX_MINIMUM_PART_SIZE {
        return Err(AccountInfoError::InvalidSession {
            message: format!(
                "minimum_part_size {} exceeds {}",
                session.minimum_part_size, MAX_MINIMUM_PART_SIZE
            ),
        });
    }
    Ok(())
}

/// Reject an `allowed` structure that fails [`allowed_is_valid`].
pub(crate) fn check_allowed(allowed: Option<&Allowed>) -> Result<()> {
    if allowed_is_valid(allowed) {
        return Ok(());
    }
    let message = match allowed {
        Some(a) if a.bucket_id.is_some() => "bucketId is set but bucketName is not",
        _ => "bucketName is set but bucketId is not",
    };
    Err(AccountInfoError::InvalidAllowed {
        message: message.to_string(),
    })
}

// ── AccountInfo trait ──────────────────────────────────────────────

/// Holder for all account-related state kept between API calls and between
/// invocations: credentials, the bucket name cache, and upload URL pools.
pub trait AccountInfo: Send + Sync {
    // ── Credentials ─────────────────────────────────────────────────

    /// Remove the session, the bucket name cache and every upload URL.
    fn clear(&self) -> Result<()>;

    /// Store the results of account authorization, replacing any previous
    /// session. Fails without touching the store with
    /// [`AccountInfoError::InvalidAllowed`] if `allowed` is not valid, or
    /// [`AccountInfoError::InvalidSession`] if `minimum_part_size` exceeds
    /// [`MAX_MINIMUM_PART_SIZE`].
    fn set_auth_data(&self, session: Session, allowed: Option<Allowed>) -> Result<()>;

    /// The stored session, or [`AccountInfoError::MissingAccountData`].
    fn get_session(&self) -> Result<Session>;

    /// The stored `allowed` structure. `Ok(None)` means unrestricted.
    fn get_allowed(&self) -> Result<Option<Allowed>>;

    fn get_account_id(&self) -> Result<String> {
        Ok(self.get_session()?.account_id)
    }

    fn get_account_auth_token(&self) -> Result<String> {
        Ok(self.get_session()?.auth_token)
    }

    fn get_api_url(&self) -> Result<String> {
        Ok(self.get_session()?.api_url)
    }

    fn get_application_key(&self) -> Result<String> {
        Ok(self.get_session()?.application_key)
    }

    fn get_download_url(&self) -> Result<String> {
        Ok(self.get_session()?.download_url)
    }

    fn get_realm(&self) -> Result<Realm> {
        Ok(self.get_session()?.realm)
    }

    /// Minimum number of bytes in a part of a large file.
    fn get_minimum_part_size(&self) -> Result<u64> {
        Ok(self.get_session()?.minimum_part_size)
    }

    /// Bucket id the token is restricted to, or `None`.
    fn get_allowed_bucket_id(&self) -> Result<Option<String>> {
        Ok(self.get_allowed()?.and_then(|a| a.bucket_id))
    }

    /// Name prefix the token is restricted to, or an empty string.
    fn get_allowed_name_prefix(&self) -> Result<String> {
        Ok(self
            .get_allowed()?
            .and_then(|a| a.name_prefix)
            .unwrap_or_default())
    }

    /// Resolve the restricted bucket id through the bucket name cache.
    fn get_bucket_name_from_allowed_or_none(&self) -> Result<Option<String>> {
        match self.get_allowed_bucket_id()? {
            Some(bucket_id) => self.get_bucket_name_or_none_from_bucket_id(&bucket_id),
            None => Ok(None),
        }
    }

    // ── Bucket name cache ───────────────────────────────────────────

    /// Replace every name-to-id mapping with `name_id_pairs`, given as
    /// `(bucket_name, bucket_id)`. Later pairs win over earlier ones.
    fn refresh_entire_bucket_name_cache(&self, name_id_pairs: &[(String, String)]) -> Result<()>;

    /// Remember the id for a bucket name.
    fn save_bucket(&self, bucket: &Bucket) -> Result<()>;

    /// Forget one bucket name. Unknown names are ignored.
    fn remove_bucket_name(&self, bucket_name: &str) -> Result<()>;

    fn get_bucket_id_or_none_from_bucket_name(&self, bucket_name: &str) -> Result<Option<String>>;

    fn get_bucket_name_or_none_from_bucket_id(&self, bucket_id: &str) -> Result<Option<String>>;

    // ── Bucket upload URLs ──────────────────────────────────────────

    /// Remove and return one upload URL for the bucket, or `None` if the
    /// pool is empty. No two callers ever receive the same pair.
    fn take_bucket_upload_url(&self, bucket_id: &str) -> Result<Option<UploadUrl>>;

    /// Add an upload URL to the pool available for the bucket.
    fn put_bucket_upload_url(
        &self,
        bucket_id: &str,
        upload_url: &str,
        upload_auth_token: &str,
    ) -> Result<()>;

    /// Drop every upload URL cached for the bucket.
    fn clear_bucket_upload_data(&self, bucket_id: &str) -> Result<()>;

    // ── Large file upload URLs ──────────────────────────────────────

    fn put_large_file_upload_url(
        &self,
        file_id: &str,
        upload_url: &str,
        upload_auth_token: &str,
    ) -> Result<()>;

    fn take_large_file_upload_url(&self, file_id: &str) -> Result<Option<UploadUrl>>;

    fn clear_large_file_upload_urls(&self, file_id: &str) -> Result<()>;
}
