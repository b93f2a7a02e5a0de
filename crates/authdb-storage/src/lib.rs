//! # authdb-storage
//!
//! Storage abstraction layer for the AuthDB account/credential/session
//! store.
//!
//! This crate defines the traits and types that all storage backends must
//! implement. It does not contain any implementations - those are provided
//! by separate crates.
//!
//! ## Overview
//!
//! The main trait is [`AuthStorage`], which defines the contract for:
//! - Account creation, lookup, lock/unlock, reset, and deletion
//! - Session tokens and their device bindings
//! - Key-fetch tokens and the three password-workflow tokens
//! - Housekeeping (`ping`/`close`) for parity with networked backends
//!
//! ## Example
//!
//! ```ignore
//! use authdb_storage::prelude::*;
//!
//! async fn sessions_for(
//!     storage: &dyn AuthStorage,
//!     uid: &Uid,
//! ) -> Result<Vec<SessionEntry>, StorageError> {
//!     storage.sessions(uid).await
//! }
//! ```
//!
//! ## Storage Backends
//!
//! To implement a storage backend, implement the [`AuthStorage`] trait:
//!
//! ```ignore
//! use async_trait::async_trait;
//! use authdb_storage::{AuthStorage, StorageError};
//!
//! struct MyStorage {
//!     // ...
//! }
//!
//! #[async_trait]
//! impl AuthStorage for MyStorage {
//!     async fn account(&self, uid: &Uid) -> Result<Account, StorageError> {
//!         // Implementation
//!     }
//!     // ... other methods
//! }
//! ```

mod error;
mod traits;
mod types;

// Re-export everything from submodules
pub use error::{ErrorCategory, StorageError};
pub use traits::AuthStorage;
pub use types::{
    Account, AccountLock, AccountReset, AccountResetTokenRecord, CALLBACK_PUBLIC_KEY_LEN, Device,
    DeviceUpdate, KeyFetchTokenRecord, NewAccount, NewAccountResetToken, NewKeyFetchToken,
    NewPasswordChangeToken, NewPasswordForgotToken, NewSessionToken, PasswordChangeTokenRecord,
    PasswordForgotTokenRecord, SessionEntry, SessionTokenRecord, SessionUpdate,
    normalize_callback_public_key, normalize_email,
};

// Identifier and descriptor types shared with backends.
pub use authdb_core::{DeviceId, Timestamp, TokenId, Uid, UserAgentInfo};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a boxed storage trait object.
pub type DynAuthStorage = std::sync::Arc<dyn AuthStorage>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use authdb_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::AuthStorage;
    pub use crate::types::{
        Account, AccountLock, AccountReset, AccountResetTokenRecord, Device, DeviceUpdate,
        KeyFetchTokenRecord, NewAccount, NewAccountResetToken, NewKeyFetchToken,
        NewPasswordChangeToken, NewPasswordForgotToken, NewSessionToken,
        PasswordChangeTokenRecord, PasswordForgotTokenRecord, SessionEntry, SessionTokenRecord,
        SessionUpdate,
    };
    pub use crate::{DynAuthStorage, StorageResult};
    pub use authdb_core::{DeviceId, Timestamp, TokenId, Uid, UserAgentInfo};
}
