//! SQLite-backed account info store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  Each handle owns one connection under a `Mutex`;
//! every mutation runs in a `BEGIN EXCLUSIVE` transaction so handles in
//! other processes see it all-or-nothing and never interleave with it.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info};

use super::state::PoolKind;
use super::store::{
    check_allowed, check_session, AccountInfo, Allowed, Bucket, Realm, Session, UploadUrl,
};
use crate::errors::{AccountInfoError, Result};
use crate::metrics;

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Account info store backed by a single SQLite database file.
pub struct SqliteAccountInfo {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteAccountInfo {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates a private in-memory database.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        info!("SQLite account info store at {}", path.display());
        Ok(store)
    }

    /// Apply pragmas for concurrent access from several processes.
    fn apply_pragmas(&self) -> Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA busy_timeout = 5000;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// Idempotent, so every handle runs it on open.
    fn init_db(&self) -> Result<()> {
        let mut conn = self.conn.lock().expect("mutex poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
        tx.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY
            );

            -- Single row holding the authorized session
            CREATE TABLE IF NOT EXISTS account (
                id                  INTEGER PRIMARY KEY CHECK (id = 1),
                account_id          TEXT NOT NULL,
                account_auth_token  TEXT NOT NULL,
                api_url             TEXT NOT NULL,
                download_url        TEXT NOT NULL,
                minimum_part_size   INTEGER NOT NULL,
                application_key     TEXT NOT NULL,
                realm               TEXT NOT NULL,
                allowed             TEXT
            );

            -- Bucket name cache
            CREATE TABLE IF NOT EXISTS bucket (
                bucket_name  TEXT PRIMARY KEY,
                bucket_id    TEXT NOT NULL UNIQUE
            );

            -- Upload URL pools
            CREATE TABLE IF NOT EXISTS bucket_upload_url (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                bucket_id          TEXT NOT NULL,
                upload_url         TEXT NOT NULL,
                upload_auth_token  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bucket_upload_url_bucket
                ON bucket_upload_url(bucket_id);

            CREATE TABLE IF NOT EXISTS large_file_upload_url (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id            TEXT NOT NULL,
                upload_url         TEXT NOT NULL,
                upload_auth_token  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_large_file_upload_url_file
                ON large_file_upload_url(file_id);
            ",
        )?;

        let existing: Option<i64> = tx
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        match existing {
            None => {
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(version) if version > SCHEMA_VERSION => {
                return Err(AccountInfoError::UnsupportedVersion {
                    version: u32::try_from(version).unwrap_or(u32::MAX),
                });
            }
            Some(_) => {}
        }

        tx.commit()?;
        Ok(())
    }

    /// Run `f` inside an exclusive transaction and commit it.
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().expect("mutex poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn read_account(&self) -> Result<Option<(Session, Option<Allowed>)>> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let row = conn
            .query_row(
                "SELECT account_id, account_auth_token, api_url, download_url,
                        minimum_part_size, application_key, realm, allowed
                 FROM account WHERE id = 1",
                [],
                |row| {
                    let stored_part_size: i64 = row.get(4)?;
                    let minimum_part_size = u64::try_from(stored_part_size).map_err(|_| {
                        rusqlite::Error::IntegralValueOutOfRange(4, stored_part_size)
                    })?;
                    let realm: String = row.get(6)?;
                    let session = Session {
                        account_id: row.get(0)?,
                        auth_token: row.get(1)?,
                        api_url: row.get(2)?,
                        download_url: row.get(3)?,
                        minimum_part_size,
                        application_key: row.get(5)?,
                        realm: Realm::from(realm),
                    };
                    let allowed: Option<String> = row.get(7)?;
                    Ok((session, allowed))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((session, allowed)) => {
                let allowed = allowed
                    .map(|json| serde_json::from_str::<Allowed>(&json))
                    .transpose()?;
                Ok(Some((session, allowed)))
            }
        }
    }

    fn take_url(&self, kind: PoolKind, key: &str) -> Result<Option<UploadUrl>> {
        let (table, key_column) = pool_table(kind);
        let taken = self.write(|tx| {
            let row = tx
                .query_row(
                    &format!(
                        "SELECT id, upload_url, upload_auth_token FROM {table}
                         WHERE {key_column} = ?1 ORDER BY id DESC LIMIT 1"
                    ),
                    params![key],
                    |row| {
                        let id: i64 = row.get(0)?;
                        Ok((id, UploadUrl::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
                    },
                )
                .optional()?;
            match row {
                Some((id, url)) => {
                    tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
                    Ok(Some(url))
                }
                None => Ok(None),
            }
        })?;
        metrics::record_take(kind, taken.is_some());
        debug!(
            "Take {} upload URL for {}: {}",
            kind.label(),
            key,
            if taken.is_some() { "hit" } else { "miss" }
        );
        Ok(taken)
    }

    fn put_url(&self, kind: PoolKind, key: &str, upload_url: &str, upload_auth_token: &str) -> Result<()> {
        let (table, key_column) = pool_table(kind);
        self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {table} ({key_column}, upload_url, upload_auth_token)
                     VALUES (?1, ?2, ?3)"
                ),
                params![key, upload_url, upload_auth_token],
            )?;
            Ok(())
        })?;
        metrics::record_put(kind);
        debug!("Put {} upload URL for {}", kind.label(), key);
        Ok(())
    }

    fn clear_urls(&self, kind: PoolKind, key: &str) -> Result<()> {
        let (table, key_column) = pool_table(kind);
        let dropped = self.write(|tx| {
            Ok(tx.execute(
                &format!("DELETE FROM {table} WHERE {key_column} = ?1"),
                params![key],
            )?)
        })?;
        debug!("Cleared {} {} upload URLs for {}", dropped, kind.label(), key);
        Ok(())
    }
}

/// Table and key column holding a pool.
fn pool_table(kind: PoolKind) -> (&'static str, &'static str) {
    match kind {
        PoolKind::Bucket => ("bucket_upload_url", "bucket_id"),
        PoolKind::LargeFile => ("large_file_upload_url", "file_id"),
    }
}

/// Upsert one bucket mapping, dropping rows that conflict on name or id.
fn upsert_bucket(tx: &Transaction<'_>, bucket: &Bucket) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM bucket WHERE bucket_name = ?1 OR bucket_id = ?2",
        params![bucket.name, bucket.id],
    )?;
    tx.execute(
        "INSERT INTO bucket (bucket_name, bucket_id) VALUES (?1, ?2)",
        params![bucket.name, bucket.id],
    )?;
    Ok(())
}

// ── AccountInfo implementation ─────────────────────────────────────

impl AccountInfo for SqliteAccountInfo {
    // ── Credentials ─────────────────────────────────────────────────

    fn clear(&self) -> Result<()> {
        self.write(|tx| {
            tx.execute_batch(
                "
                DELETE FROM account;
                DELETE FROM bucket;
                DELETE FROM bucket_upload_url;
                DELETE FROM large_file_upload_url;
                ",
            )?;
            Ok(())
        })?;
        info!("Account info cleared");
        Ok(())
    }

    fn set_auth_data(&self, session: Session, allowed: Option<Allowed>) -> Result<()> {
        check_allowed(allowed.as_ref())?;
        check_session(&session)?;
        let allowed_json = allowed.as_ref().map(serde_json::to_string).transpose()?;
        let minimum_part_size = i64::try_from(session.minimum_part_size).map_err(|_| {
            AccountInfoError::InvalidSession {
                message: format!("minimum_part_size {} out of range", session.minimum_part_size),
            }
        })?;
        self.write(|tx| {
            tx.execute(
                "INSERT OR REPLACE INTO account (
                    id, account_id, account_auth_token, api_url, download_url,
                    minimum_part_size, application_key, realm, allowed
                 ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.account_id,
                    session.auth_token,
                    session.api_url,
                    session.download_url,
                    minimum_part_size,
                    session.application_key,
                    session.realm.as_str(),
                    allowed_json,
                ],
            )?;
            Ok(())
        })?;
        info!(
            "Stored auth data for account {} in realm {}",
            session.account_id, session.realm
        );
        Ok(())
    }

    fn get_session(&self) -> Result<Session> {
        self.read_account()?
            .map(|(session, _)| session)
            .ok_or(AccountInfoError::MissingAccountData)
    }

    fn get_allowed(&self) -> Result<Option<Allowed>> {
        self.read_account()?
            .map(|(_, allowed)| allowed)
            .ok_or(AccountInfoError::MissingAccountData)
    }

    // ── Bucket name cache ───────────────────────────────────────────

    fn refresh_entire_bucket_name_cache(&self, name_id_pairs: &[(String, String)]) -> Result<()> {
        self.write(|tx| {
            tx.execute("DELETE FROM bucket", [])?;
            for (name, id) in name_id_pairs {
                upsert_bucket(tx, &Bucket::new(name.as_str(), id.as_str()))?;
            }
            Ok(())
        })?;
        debug!(
            "Bucket name cache refreshed from {} pairs",
            name_id_pairs.len()
        );
        Ok(())
    }

    fn save_bucket(&self, bucket: &Bucket) -> Result<()> {
        self.write(|tx| Ok(upsert_bucket(tx, bucket)?))?;
        debug!("Saved bucket {} -> {}", bucket.name, bucket.id);
        Ok(())
    }

    fn remove_bucket_name(&self, bucket_name: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM bucket WHERE bucket_name = ?1",
                params![bucket_name],
            )?;
            Ok(())
        })?;
        debug!("Removed bucket name {}", bucket_name);
        Ok(())
    }

    fn get_bucket_id_or_none_from_bucket_name(&self, bucket_name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let id = conn
            .query_row(
                "SELECT bucket_id FROM bucket WHERE bucket_name = ?1",
                params![bucket_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn get_bucket_name_or_none_from_bucket_id(&self, bucket_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let name = conn
            .query_row(
                "SELECT bucket_name FROM bucket WHERE bucket_id = ?1",
                params![bucket_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    // ── Upload URL pools ────────────────────────────────────────────

    fn take_bucket_upload_url(&self, bucket_id: &str) -> Result<Option<UploadUrl>> {
        self.take_url(PoolKind::Bucket, bucket_id)
    }

    fn put_bucket_upload_url(
        &self,
        bucket_id: &str,
        upload_url: &str,
        upload_auth_token: &str,
    ) -> Result<()> {
        self.put_url(PoolKind::Bucket, bucket_id, upload_url, upload_auth_token)
    }

    fn clear_bucket_upload_data(&self, bucket_id: &str) -> Result<()> {
        self.clear_urls(PoolKind::Bucket, bucket_id)
    }

    fn put_large_file_upload_url(
        &self,
        file_id: &str,
        upload_url: &str,
        upload_auth_token: &str,
    ) -> Result<()> {
        self.put_url(PoolKind::LargeFile, file_id, upload_url, upload_auth_token)
    }

    fn take_large_file_upload_url(&self, file_id: &str) -> Result<Option<UploadUrl>> {
        self.take_url(PoolKind::LargeFile, file_id)
    }

    fn clear_large_file_upload_urls(&self, file_id: &str) -> Result<()> {
        self.clear_urls(PoolKind::LargeFile, file_id)
    }
}
