//! Integration tests for credential persistence

use crate::common::{token_expiring_in, user};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, TimeZone, Utc};
use live_quotes::credentials::{CredentialStore, FileStorage, MemoryStorage};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn file_store(path: &std::path::Path) -> CredentialStore {
    CredentialStore::new(Arc::new(FileStorage::new(path)))
}

#[test]
fn test_file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");
    let token = token_expiring_in(3600);

    assert_ok!(file_store(&path).set_credential(&token, &user()));

    let reopened = file_store(&path);
    let credential = reopened.get_credential().unwrap();
    assert_eq!(credential.token, token);
    assert_eq!(credential.issued_user, user());
    assert!(!reopened.is_expired());
}

#[test]
fn test_stored_values_are_not_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let token = token_expiring_in(3600);

    assert_ok!(file_store(&path).set_credential(&token, &user()));

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains(&token));
    assert!(!raw.contains("kiran@example.com"));
}

#[test]
fn test_corrupt_file_reads_as_logged_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let store = file_store(&path);
    assert!(!store.has_credential());
    assert!(store.get_credential().is_none());
    assert!(store.is_expired());
    assert_eq!(store.usable_token(), None);
}

#[test]
fn test_unwritable_path_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "file, not a directory").unwrap();

    let store = file_store(&blocker.join("session.json"));
    assert_err!(store.set_credential("token", &user()));
    assert!(!store.has_credential());
}

#[test]
fn test_expiry_window_boundaries() {
    let exp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp.timestamp()));
    let token = format!("h.{}.s", payload);

    let store = CredentialStore::new(Arc::new(MemoryStorage::new()))
        .with_validity(Duration::hours(24));
    assert_ok!(store.set_credential(&token, &user()));

    let edge = exp + Duration::hours(24);
    assert!(!store.is_expired_at(exp));
    assert!(!store.is_expired_at(edge));
    assert!(store.is_expired_at(edge + Duration::seconds(1)));
}

#[test]
fn test_opaque_token_never_expires() {
    let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
    assert_ok!(store.set_credential("opaque-session-id", &user()));

    assert!(!store.is_expired_at(Utc::now() + Duration::days(3650)));
    assert_eq!(store.usable_token().as_deref(), Some("opaque-session-id"));
}

#[test]
fn test_expired_token_is_not_usable_but_still_stored() {
    let store = CredentialStore::new(Arc::new(MemoryStorage::new()))
        .with_validity(Duration::zero());
    assert_ok!(store.set_credential(&token_expiring_in(-60), &user()));

    assert!(store.has_credential());
    assert!(store.is_expired());
    assert_eq!(store.usable_token(), None);
}

#[test]
fn test_clear_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("session.json"));
    assert_ok!(store.set_credential(&token_expiring_in(3600), &user()));

    store.clear();
    store.clear();

    assert!(!store.has_credential());
    assert!(store.user().is_none());
}
