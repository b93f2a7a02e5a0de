use std::sync::Arc;

use authdb_storage::DynAuthStorage;

use crate::InMemoryAuthStore;

/// Supported storage backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-memory storage guarded by a single RwLock.
    Memory,
}

/// Storage-specific configuration options.
///
/// These are best-effort hints for the in-memory backend, accepted for
/// parity with a durable backend's connection options.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Initial capacity hint for the account and email tables.
    pub preallocate_accounts: Option<usize>,
}

/// Factory configuration to construct a storage instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub options: StoreOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            options: StoreOptions::default(),
        }
    }
}

/// Create a storage instance based on the provided configuration.
///
/// For now, only the in-memory backend is supported.
pub fn create_store(config: &StoreConfig) -> DynAuthStorage {
    match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryAuthStore::with_options(config.options.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use authdb_core::{Timestamp, Uid};
    use authdb_storage::{AuthStorage, NewAccount};

    fn account_payload(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            open_id: None,
            verify_hash: vec![0x11; 32],
            auth_salt: vec![0x22; 32],
            wrap_wrap_kb: vec![0x33; 32],
            verifier_set_at: Timestamp::from_str("2024-02-01T00:00:00Z").unwrap(),
            verifier_version: 1,
            email_verified: false,
            email_code: vec![0x44; 16],
            locale: None,
            created_at: Timestamp::from_str("2024-01-01T00:00:00Z").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_default_config_yields_working_store() {
        let store = create_store(&StoreConfig::default());
        assert_eq!(store.backend_name(), "memory");
        assert!(store.ping().await.is_ok());
        assert!(store.close().await.is_ok());
        // Close holds nothing open; the store keeps working.
        assert!(!store.account_exists("nobody@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let first = create_store(&StoreConfig::default());
        let second = create_store(&StoreConfig::default());

        let uid = Uid::from_bytes([7; 16]);
        first
            .create_account(&uid, &account_payload("iso@example.com"))
            .await
            .unwrap();

        // Populating one store must not leak into the other.
        assert!(first.account(&uid).await.is_ok());
        assert!(second.account(&uid).await.unwrap_err().is_not_found());
        assert!(!second.account_exists("iso@example.com").await.unwrap());
    }

    #[test]
    fn test_preallocation_hint_is_accepted() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            options: StoreOptions {
                preallocate_accounts: Some(1024),
            },
        };
        let _store = create_store(&config);
    }
}
