//! In-memory AuthDB storage backend.
//!
//! This crate provides an in-memory implementation of the `AuthStorage`
//! trait from `authdb-storage`. It is a drop-in substitute for a durable
//! backend behind the identical data-access contract: non-persistent, but
//! enforcing the same referential and uniqueness invariants a real backend
//! would enforce via schema constraints and transactions.
//!
//! All tables live behind a single lock, so every operation - including
//! multi-table cascades and the composite forgot-password workflow - is
//! observably atomic.
//!
//! # Example
//!
//! ```ignore
//! use authdb_db_memory::create_auth_store;
//!
//! let storage = create_auth_store();
//! storage.create_account(&uid, &new_account).await?;
//! let account = storage.account(&uid).await?;
//! ```

pub mod factory;
pub mod store;
mod store_impl;
mod transaction;

// Re-export the AuthStorage trait for convenience
pub use authdb_storage::{AuthStorage, DynAuthStorage, StorageError};

pub use factory::{StoreBackend, StoreConfig, StoreOptions, create_store};
pub use store::InMemoryAuthStore;

/// Creates a new in-memory AuthStorage instance with default options.
pub fn create_auth_store() -> DynAuthStorage {
    std::sync::Arc::new(InMemoryAuthStore::new())
}
