//! Upload URL pool metrics.
//!
//! Counters are emitted through the `metrics` facade.  They are no-ops
//! unless the embedding application installs a recorder.

use metrics::{counter, describe_counter};

use crate::account_info::state::PoolKind;

// -- Metric name constants ----------------------------------------------------

/// Upload URL take attempts (counter). Labels: pool, result (hit|miss).
pub const UPLOAD_URL_POOL_TAKES_TOTAL: &str = "b2_upload_url_pool_takes_total";

/// Upload URLs returned to a pool (counter). Labels: pool.
pub const UPLOAD_URL_POOL_PUTS_TOTAL: &str = "b2_upload_url_pool_puts_total";

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(
        UPLOAD_URL_POOL_TAKES_TOTAL,
        "Upload URL take attempts by pool and result"
    );
    describe_counter!(
        UPLOAD_URL_POOL_PUTS_TOTAL,
        "Upload URLs returned to a pool"
    );
}

pub(crate) fn record_take(kind: PoolKind, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(UPLOAD_URL_POOL_TAKES_TOTAL, "pool" => kind.label(), "result" => result)
        .increment(1);
}

pub(crate) fn record_put(kind: PoolKind) {
    counter!(UPLOAD_URL_POOL_PUTS_TOTAL, "pool" => kind.label()).increment(1);
}
