//! b2-account-info — cached account state for a B2-style storage client.
//!
//! This crate keeps the results of account authorization, a bucket name
//! cache, and pools of pre-authorized upload URLs between API calls and
//! between process invocations.  Stores are safe to share between threads
//! and, for the file and SQLite backends, between processes.

pub mod account_info;
pub mod config;
pub mod errors;
pub mod metrics;

pub use account_info::{open_account_info, AccountInfo};
pub use errors::{AccountInfoError, Result};
