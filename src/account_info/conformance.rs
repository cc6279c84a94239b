//! Behavior every [`AccountInfo`] backend must share.
//!
//! Each backend's test module runs these checks against a fresh store.

use std::collections::{BTreeSet, HashSet};
use std::sync::Barrier;
use std::thread;

use super::store::{
    AccountInfo, Allowed, Bucket, Realm, Session, UploadUrl, MAX_MINIMUM_PART_SIZE,
};
use crate::errors::AccountInfoError;

pub fn make_session(account_id: &str) -> Session {
    Session {
        account_id: account_id.to_string(),
        auth_token: format!("auth-token-{account_id}"),
        api_url: "https://api001.backblazeb2.com".to_string(),
        download_url: "https://f001.backblazeb2.com".to_string(),
        minimum_part_size: 5_000_000,
        application_key: format!("app-key-{account_id}"),
        realm: Realm::Production,
    }
}

pub fn make_allowed(bucket: Option<(&str, &str)>, prefix: Option<&str>) -> Allowed {
    Allowed {
        bucket_id: bucket.map(|(id, _)| id.to_string()),
        bucket_name: bucket.map(|(_, name)| name.to_string()),
        name_prefix: prefix.map(str::to_string),
        capabilities: ["listFiles", "writeFiles"]
            .iter()
            .map(|c| c.to_string())
            .collect::<BTreeSet<_>>(),
    }
}

fn assert_missing<T: std::fmt::Debug>(result: crate::errors::Result<T>) {
    match result {
        Err(AccountInfoError::MissingAccountData) => {}
        other => panic!("expected MissingAccountData, got {other:?}"),
    }
}

pub fn run_all(store: &dyn AccountInfo) {
    missing_before_auth(store);
    auth_round_trip(store);
    invalid_allowed_rejected(store);
    minimum_part_size_limits(store);
    clear_removes_everything(store);
    allowed_derived_getters(store);
    bucket_cache(store);
    refresh_replaces_cache(store);
    bucket_upload_pool(store);
    large_file_upload_pool(store);
    store.clear().unwrap();
}

pub fn missing_before_auth(store: &dyn AccountInfo) {
    store.clear().unwrap();
    assert_missing(store.get_session());
    assert_missing(store.get_account_id());
    assert_missing(store.get_account_auth_token());
    assert_missing(store.get_api_url());
    assert_missing(store.get_application_key());
    assert_missing(store.get_download_url());
    assert_missing(store.get_realm());
    assert_missing(store.get_minimum_part_size());
    assert_missing(store.get_allowed());
    assert_missing(store.get_allowed_bucket_id());
    assert_missing(store.get_allowed_name_prefix());
    assert_missing(store.get_bucket_name_from_allowed_or_none());
}

pub fn auth_round_trip(store: &dyn AccountInfo) {
    store.clear().unwrap();
    let mut session = make_session("acct1");
    session.realm = Realm::Staging;
    let allowed = make_allowed(None, None);
    store
        .set_auth_data(session.clone(), Some(allowed.clone()))
        .unwrap();

    assert_eq!(store.get_session().unwrap(), session);
    assert_eq!(store.get_account_id().unwrap(), "acct1");
    assert_eq!(store.get_account_auth_token().unwrap(), "auth-token-acct1");
    assert_eq!(
        store.get_api_url().unwrap(),
        "https://api001.backblazeb2.com"
    );
    assert_eq!(store.get_application_key().unwrap(), "app-key-acct1");
    assert_eq!(
        store.get_download_url().unwrap(),
        "https://f001.backblazeb2.com"
    );
    assert_eq!(store.get_realm().unwrap(), Realm::Staging);
    assert_eq!(store.get_minimum_part_size().unwrap(), 5_000_000);
    assert_eq!(store.get_allowed().unwrap(), Some(allowed));

    // Overwrite replaces the whole session.
    store.set_auth_data(make_session("acct2"), None).unwrap();
    assert_eq!(store.get_account_id().unwrap(), "acct2");
    assert_eq!(store.get_realm().unwrap(), Realm::Production);
    assert_eq!(store.get_allowed().unwrap(), None);
}

pub fn invalid_allowed_rejected(store: &dyn AccountInfo) {
    store.clear().unwrap();
    store.set_auth_data(make_session("before"), None).unwrap();

    let mut bad = make_allowed(None, None);
    bad.bucket_id = Some("x".to_string());
    let err = store
        .set_auth_data(make_session("after"), Some(bad))
        .unwrap_err();
    assert!(matches!(err, AccountInfoError::InvalidAllowed { .. }));

    // The previous session is untouched.
    assert_eq!(store.get_account_id().unwrap(), "before");
}

pub fn minimum_part_size_limits(store: &dyn AccountInfo) {
    store.clear().unwrap();
    let mut session = make_session("largest");
    session.minimum_part_size = MAX_MINIMUM_PART_SIZE;
    store.set_auth_data(session, None).unwrap();
    assert_eq!(store.get_minimum_part_size().unwrap(), MAX_MINIMUM_PART_SIZE);

    let mut session = make_session("too-large");
    session.minimum_part_size = u64::MAX;
    let err = store.set_auth_data(session, None).unwrap_err();
    assert!(matches!(err, AccountInfoError::InvalidSession { .. }));
    assert_eq!(store.get_account_id().unwrap(), "largest");
    assert_eq!(store.get_minimum_part_size().unwrap(), MAX_MINIMUM_PART_SIZE);
}

pub fn clear_removes_everything(store: &dyn AccountInfo) {
    store.clear().unwrap();
    store
        .set_auth_data(make_session("acct"), Some(make_allowed(None, None)))
        .unwrap();
    store.save_bucket(&Bucket::new("b1", "1")).unwrap();
    store.put_bucket_upload_url("1", "u", "t").unwrap();
    store.put_large_file_upload_url("f", "u", "t").unwrap();

    store.clear().unwrap();

    assert_missing(store.get_account_id());
    assert_missing(store.get_allowed());
    assert_eq!(store.get_bucket_id_or_none_from_bucket_name("b1").unwrap(), None);
    assert_eq!(store.take_bucket_upload_url("1").unwrap(), None);
    assert_eq!(store.take_large_file_upload_url("f").unwrap(), None);
}

pub fn allowed_derived_getters(store: &dyn AccountInfo) {
    store.clear().unwrap();
    store.set_auth_data(make_session("acct"), None).unwrap();
    assert_eq!(store.get_allowed_bucket_id().unwrap(), None);
    assert_eq!(store.get_allowed_name_prefix().unwrap(), "");
    assert_eq!(store.get_bucket_name_from_allowed_or_none().unwrap(), None);

    store
        .set_auth_data(
            make_session("acct"),
            Some(make_allowed(Some(("bid", "photos")), Some("2024/"))),
        )
        .unwrap();
    assert_eq!(store.get_allowed_bucket_id().unwrap().as_deref(), Some("bid"));
    assert_eq!(store.get_allowed_name_prefix().unwrap(), "2024/");
    // Not cached yet.
    assert_eq!(store.get_bucket_name_from_allowed_or_none().unwrap(), None);

    store.save_bucket(&Bucket::new("photos", "bid")).unwrap();
    assert_eq!(
        store.get_bucket_name_from_allowed_or_none().unwrap().as_deref(),
        Some("photos")
    );
}

pub fn bucket_cache(store: &dyn AccountInfo) {
    store.clear().unwrap();
    assert_eq!(store.get_bucket_id_or_none_from_bucket_name("b1").unwrap(), None);

    store.save_bucket(&Bucket::new("b1", "1")).unwrap();
    store.save_bucket(&Bucket::new("b1", "2")).unwrap();
    assert_eq!(
        store.get_bucket_id_or_none_from_bucket_name("b1").unwrap().as_deref(),
        Some("2")
    );
    assert_eq!(store.get_bucket_name_or_none_from_bucket_id("1").unwrap(), None);

    // Renaming a bucket id drops the old name.
    store.save_bucket(&Bucket::new("b1-renamed", "2")).unwrap();
    assert_eq!(store.get_bucket_id_or_none_from_bucket_name("b1").unwrap(), None);
    assert_eq!(
        store.get_bucket_name_or_none_from_bucket_id("2").unwrap().as_deref(),
        Some("b1-renamed")
    );

    store.remove_bucket_name("nonexistent").unwrap();
    assert_eq!(
        store
            .get_bucket_id_or_none_from_bucket_name("b1-renamed")
            .unwrap()
            .as_deref(),
        Some("2")
    );

    store.remove_bucket_name("b1-renamed").unwrap();
    assert_eq!(
        store.get_bucket_id_or_none_from_bucket_name("b1-renamed").unwrap(),
        None
    );
    assert_eq!(store.get_bucket_name_or_none_from_bucket_id("2").unwrap(), None);
}

pub fn refresh_replaces_cache(store: &dyn AccountInfo) {
    store.clear().unwrap();
    store.save_bucket(&Bucket::new("stale", "0")).unwrap();

    let pairs = vec![
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
        ("a".to_string(), "3".to_string()),
    ];
    store.refresh_entire_bucket_name_cache(&pairs).unwrap();

    assert_eq!(store.get_bucket_id_or_none_from_bucket_name("stale").unwrap(), None);
    assert_eq!(
        store.get_bucket_id_or_none_from_bucket_name("a").unwrap().as_deref(),
        Some("3")
    );
    assert_eq!(
        store.get_bucket_id_or_none_from_bucket_name("b").unwrap().as_deref(),
        Some("2")
    );
    assert_eq!(store.get_bucket_name_or_none_from_bucket_id("1").unwrap(), None);

    store.refresh_entire_bucket_name_cache(&[]).unwrap();
    assert_eq!(store.get_bucket_id_or_none_from_bucket_name("a").unwrap(), None);
}

pub fn bucket_upload_pool(store: &dyn AccountInfo) {
    store.clear().unwrap();
    assert_eq!(store.take_bucket_upload_url("B").unwrap(), None);

    store.put_bucket_upload_url("B", "url1", "tok1").unwrap();
    assert_eq!(
        store.take_bucket_upload_url("B").unwrap(),
        Some(UploadUrl::new("url1", "tok1"))
    );
    assert_eq!(store.take_bucket_upload_url("B").unwrap(), None);

    store.put_bucket_upload_url("B", "url1", "tok1").unwrap();
    store.put_bucket_upload_url("B", "url2", "tok2").unwrap();
    store.put_bucket_upload_url("C", "url3", "tok3").unwrap();
    let mut taken = HashSet::new();
    taken.insert(store.take_bucket_upload_url("B").unwrap().unwrap());
    taken.insert(store.take_bucket_upload_url("B").unwrap().unwrap());
    assert_eq!(taken.len(), 2);
    assert_eq!(store.take_bucket_upload_url("B").unwrap(), None);

    // Pools are per bucket; clearing one leaves the others alone.
    store.put_bucket_upload_url("B", "url4", "tok4").unwrap();
    store.clear_bucket_upload_data("B").unwrap();
    store.clear_bucket_upload_data("never-seen").unwrap();
    assert_eq!(store.take_bucket_upload_url("B").unwrap(), None);
    assert_eq!(
        store.take_bucket_upload_url("C").unwrap(),
        Some(UploadUrl::new("url3", "tok3"))
    );

    // Bucket and large file pools do not share keys.
    store.put_bucket_upload_url("same-id", "u", "t").unwrap();
    assert_eq!(store.take_large_file_upload_url("same-id").unwrap(), None);
    assert!(store.take_bucket_upload_url("same-id").unwrap().is_some());
}

pub fn large_file_upload_pool(store: &dyn AccountInfo) {
    store.clear().unwrap();
    assert_eq!(store.take_large_file_upload_url("F").unwrap(), None);

    store.put_large_file_upload_url("F", "part-url1", "ptok1").unwrap();
    assert_eq!(
        store.take_large_file_upload_url("F").unwrap(),
        Some(UploadUrl::new("part-url1", "ptok1"))
    );

    store.put_large_file_upload_url("F", "part-url1", "ptok1").unwrap();
    store.put_large_file_upload_url("F", "part-url2", "ptok2").unwrap();
    store.put_large_file_upload_url("G", "part-url3", "ptok3").unwrap();
    store.clear_large_file_upload_urls("F").unwrap();
    assert_eq!(store.take_large_file_upload_url("F").unwrap(), None);
    assert_eq!(
        store.take_large_file_upload_url("G").unwrap(),
        Some(UploadUrl::new("part-url3", "ptok3"))
    );
}

/// `threads` callers race for `pairs` URLs, spread round-robin across
/// `stores` (several handles onto one logical store).
pub fn concurrent_take_across(stores: &[&dyn AccountInfo], threads: usize, pairs: usize) {
    let seed = stores[0];
    seed.clear().unwrap();
    for i in 0..pairs {
        seed.put_bucket_upload_url("B", &format!("url-{i}"), &format!("tok-{i}"))
            .unwrap();
    }

    let barrier = Barrier::new(threads);
    let results: Vec<Option<UploadUrl>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let store = stores[i % stores.len()];
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    store.take_bucket_upload_url("B").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let hits: Vec<UploadUrl> = results.iter().flatten().cloned().collect();
    let distinct: HashSet<&UploadUrl> = hits.iter().collect();
    assert_eq!(hits.len(), pairs.min(threads));
    assert_eq!(distinct.len(), hits.len());
    assert_eq!(
        results.iter().filter(|r| r.is_none()).count(),
        threads.saturating_sub(pairs)
    );
}

pub fn concurrent_take(store: &dyn AccountInfo, threads: usize, pairs: usize) {
    concurrent_take_across(&[store], threads, pairs);
}
