// ABOUTME: Integration tests for the file-backed OAuth token storage
// ABOUTME: Verifies the on-disk layout, owner-only permissions and clearing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::fs;

use chrono::{TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tool_gateway::errors::ErrorCode;
use tool_gateway::oauth::{FileTokenStorage, OAuthToken, ProviderConfig, StoredToken, TokenStorage};

fn record(access_token: &str) -> StoredToken {
    StoredToken {
        token: OAuthToken {
            access_token: access_token.to_owned(),
            token_type: "Bearer".to_owned(),
            refresh_token: Some("refresh".to_owned()),
            expiry: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            scope: Some("openid email".to_owned()),
        },
        config: ProviderConfig {
            client_id: "client".to_owned(),
            client_secret: "secret".to_owned(),
            auth_url: "https://accounts.example.com/auth".to_owned(),
            token_url: "https://accounts.example.com/token".to_owned(),
            redirect_url: "http://localhost:8081/oauth/callback".to_owned(),
            scopes: vec!["openid".to_owned()],
        },
    }
}

#[tokio::test]
async fn test_missing_file_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("token.json"));

    assert!(storage.load().await.unwrap().is_none());
    storage.clear().await.unwrap();
}

#[tokio::test]
async fn test_store_then_load_and_replace() {
    let dir = TempDir::new().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("token.json"));

    storage.store(&record("first")).await.unwrap();
    assert_eq!(storage.load().await.unwrap(), Some(record("first")));

    storage.store(&record("second")).await.unwrap();
    let loaded = storage.load().await.unwrap().unwrap();
    assert_eq!(loaded.token.access_token, "second");
}

#[tokio::test]
async fn test_file_layout_nests_config_as_string() {
    let dir = TempDir::new().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("token.json"));
    storage.store(&record("access")).await.unwrap();

    let raw: Value = serde_json::from_slice(&fs::read(storage.path()).unwrap()).unwrap();
    assert_eq!(raw["token"]["access_token"], "access");
    let config_json = raw["config_json"].as_str().unwrap();
    let config: Value = serde_json::from_str(config_json).unwrap();
    assert_eq!(config["client_id"], "client");
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("token.json");
    fs::write(&path, "{}").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    let storage = FileTokenStorage::new(&path);
    storage.store(&record("access")).await.unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_clear_removes_file() {
    let dir = TempDir::new().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("token.json"));
    storage.store(&record("access")).await.unwrap();

    storage.clear().await.unwrap();
    assert!(!storage.path().exists());
    assert!(storage.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_file_is_storage_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("token.json");
    fs::write(&path, "not json").unwrap();

    let err = FileTokenStorage::new(&path).load().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::StorageError);
}
