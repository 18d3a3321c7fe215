#![allow(dead_code)]
#![expect(clippy::expect_used)]

use std::sync::Arc;

use lms_client::Config;
use lms_client::CredentialsStoreMode;
use lms_client::SessionManager;
use lms_client::StoredAuth;
use lms_client::TokenStorage;
use lms_client::auth::MemoryTokenStorage;
use lms_client::models::Role;
use lms_client::models::User;
use serde_json::json;

pub fn memory_config(base_url: &str) -> Config {
    Config::new(base_url, std::env::temp_dir())
        .map(|config| config.with_store_mode(CredentialsStoreMode::Memory))
        .expect("config should build")
}

/// Fresh manager over an in-memory store, pointed at the mock backend.
pub fn manager(base_url: &str) -> (SessionManager, Arc<MemoryTokenStorage>) {
    let storage = Arc::new(MemoryTokenStorage::default());
    let config = memory_config(base_url);
    let manager = SessionManager::with_storage(&config, storage.clone());
    (manager, storage)
}

pub fn seed_tokens(storage: &MemoryTokenStorage, access: &str, refresh: &str) {
    storage
        .save(&StoredAuth {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            user: None,
            last_refresh: None,
        })
        .expect("seed store");
}

pub fn alice() -> User {
    User {
        id: 1,
        username: "alice".to_string(),
        email: "alice@x.com".to_string(),
        role: Role::Student,
        mobile_no: None,
    }
}

pub fn alice_json() -> serde_json::Value {
    json!({"id": 1, "username": "alice", "email": "alice@x.com", "role": "student"})
}
