//! Storage traits for the AuthDB storage abstraction layer.
//!
//! This module defines the data-access contract that every backend must
//! implement. The in-memory backend in `authdb-db-memory` and any durable
//! backend expose identical behavior behind this trait.

use async_trait::async_trait;

use authdb_core::{DeviceId, TokenId, Uid};

use crate::error::StorageError;
use crate::types::{
    Account, AccountLock, AccountReset, AccountResetTokenRecord, Device, DeviceUpdate,
    KeyFetchTokenRecord, NewAccount, NewAccountResetToken, NewKeyFetchToken,
    NewPasswordChangeToken, NewPasswordForgotToken, NewSessionToken, PasswordChangeTokenRecord,
    PasswordForgotTokenRecord, SessionEntry, SessionTokenRecord, SessionUpdate,
};

/// The data-access contract consumed by the authentication service.
///
/// Implementations must be thread-safe (`Send + Sync`) and must make every
/// multi-collection operation observably atomic: no caller may see partial
/// state from a cascade, a device (un)binding, or the composite
/// forgot-password workflow.
///
/// # Example
///
/// ```ignore
/// use authdb_storage::{AuthStorage, StorageError};
///
/// async fn is_verified(storage: &dyn AuthStorage, uid: &Uid) -> Result<bool, StorageError> {
///     Ok(storage.account(uid).await?.email_verified)
/// }
/// ```
#[async_trait]
pub trait AuthStorage: Send + Sync {
    // ==================== Accounts ====================

    /// Creates a new account and populates the email/openId indices in the
    /// same atomic mutation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if the uid, the normalized email,
    /// or a supplied openId is already in use.
    async fn create_account(&self, uid: &Uid, account: &NewAccount) -> Result<(), StorageError>;

    /// Reads an account by uid, returning the filtered view.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    async fn account(&self, uid: &Uid) -> Result<Account, StorageError>;

    /// Reads an account by email address. The input is case-folded before
    /// the index lookup.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no account has that email.
    async fn email_record(&self, email: &str) -> Result<Account, StorageError>;

    /// Reads an account by external identity-provider id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no account has that openId.
    async fn open_id_record(&self, open_id: &str) -> Result<Account, StorageError>;

    /// Returns whether any account uses the given email address.
    async fn account_exists(&self, email: &str) -> Result<bool, StorageError>;

    /// Compares a supplied verify hash against the stored one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::IncorrectPassword` when the account is absent
    /// or the hash mismatches; the two cases are indistinguishable so
    /// account existence is not leaked.
    async fn check_password(&self, uid: &Uid, verify_hash: &[u8]) -> Result<(), StorageError>;

    /// Marks the account's email as verified. Succeeds silently when the
    /// account does not exist.
    async fn verify_email(&self, uid: &Uid) -> Result<(), StorageError>;

    /// Overwrites the account's locale.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    async fn update_locale(&self, uid: &Uid, locale: &str) -> Result<(), StorageError>;

    /// Replaces the account's credential fields and cascades deletion of
    /// every token, the unlock code, and the device collection. The account
    /// row and identity indices are preserved.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    /// Returns `StorageError::Integrity` if the cascade finds inconsistent
    /// back-references; this is unrecoverable.
    async fn reset_account(&self, uid: &Uid, reset: &AccountReset) -> Result<(), StorageError>;

    /// Deletes the account: the same cascade as a reset, plus removal of
    /// the email/openId index entries and the account row itself.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    /// Returns `StorageError::Integrity` as for `reset_account`.
    async fn delete_account(&self, uid: &Uid) -> Result<(), StorageError>;

    // ==================== Account lock ====================

    /// Sets the lock timestamp and installs an unlock code, overwriting any
    /// prior code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    async fn lock_account(&self, uid: &Uid, lock: &AccountLock) -> Result<(), StorageError>;

    /// Clears the lock timestamp and removes the unlock code. Unlocking a
    /// nonexistent account is a no-op, not an error: callers are expected
    /// to have verified existence already.
    async fn unlock_account(&self, uid: &Uid) -> Result<(), StorageError>;

    /// Reads the unlock code installed for an account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no code is installed.
    async fn unlock_code(&self, uid: &Uid) -> Result<Vec<u8>, StorageError>;

    // ==================== Session tokens ====================

    /// Creates a session token with `last_access_time = created_at` and no
    /// device link.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if the token id already exists.
    async fn create_session_token(
        &self,
        token_id: &TokenId,
        token: &NewSessionToken,
    ) -> Result<(), StorageError>;

    /// Reads a session token, joined with the owning account's fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn session_token(&self, token_id: &TokenId) -> Result<SessionTokenRecord, StorageError>;

    /// Overwrites a session token's user-agent fields and last-access time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn update_session_token(
        &self,
        token_id: &TokenId,
        update: &SessionUpdate,
    ) -> Result<(), StorageError>;

    /// Deletes a session token. Idempotent: absence is success.
    async fn delete_session_token(&self, token_id: &TokenId) -> Result<(), StorageError>;

    /// Lists all session tokens owned by an account.
    async fn sessions(&self, uid: &Uid) -> Result<Vec<SessionEntry>, StorageError>;

    // ==================== Devices ====================

    /// Registers a device under an account, applying the merge semantics of
    /// [`DeviceUpdate`]. Binding a session token updates both sides of the
    /// session↔device relation in the same mutation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    /// Returns `StorageError::Duplicate` if the device id already exists for
    /// that account, or if the named session token is already bound to a
    /// different device.
    async fn create_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
        info: &DeviceUpdate,
    ) -> Result<Device, StorageError>;

    /// Updates a device with the merge semantics of [`DeviceUpdate`].
    /// Re-binding to a different session token unlinks the old one first;
    /// omitting `session_token_id` leaves the binding untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the device does not exist for
    /// that account. Returns `StorageError::Duplicate` if the named session
    /// token is already bound to a different device.
    async fn update_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
        info: &DeviceUpdate,
    ) -> Result<Device, StorageError>;

    /// Deletes a device, cascading deletion of its bound session token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the device does not exist.
    async fn delete_device(&self, uid: &Uid, device_id: &DeviceId) -> Result<(), StorageError>;

    /// Lists an account's devices. A nonexistent account has no devices:
    /// the result is an empty list, not an error.
    async fn account_devices(&self, uid: &Uid) -> Result<Vec<Device>, StorageError>;

    // ==================== Key-fetch tokens ====================

    /// Creates a key-fetch token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if the token id already exists.
    async fn create_key_fetch_token(
        &self,
        token_id: &TokenId,
        token: &NewKeyFetchToken,
    ) -> Result<(), StorageError>;

    /// Reads a key-fetch token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn key_fetch_token(&self, token_id: &TokenId)
    -> Result<KeyFetchTokenRecord, StorageError>;

    /// Deletes a key-fetch token. Idempotent.
    async fn delete_key_fetch_token(&self, token_id: &TokenId) -> Result<(), StorageError>;

    // ==================== Password-forgot tokens ====================

    /// Creates a password-forgot token, replacing any existing token for
    /// the same account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Duplicate` if a token with the same id
    /// already exists (checked before the per-account replacement).
    async fn create_password_forgot_token(
        &self,
        token_id: &TokenId,
        token: &NewPasswordForgotToken,
    ) -> Result<(), StorageError>;

    /// Reads a password-forgot token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn password_forgot_token(
        &self,
        token_id: &TokenId,
    ) -> Result<PasswordForgotTokenRecord, StorageError>;

    /// Overwrites the tries counter of a password-forgot token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn update_password_forgot_token(
        &self,
        token_id: &TokenId,
        tries: u32,
    ) -> Result<(), StorageError>;

    /// Deletes a password-forgot token. Idempotent.
    async fn delete_password_forgot_token(&self, token_id: &TokenId)
    -> Result<(), StorageError>;

    /// Completes the forgot-password workflow as one atomic unit: deletes
    /// the forgot token, creates the account-reset token (replacing any
    /// prior one), marks the account's email verified, and clears the lock
    /// state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the forgot token does not exist.
    /// On any failure partway the store is left as if the call never
    /// happened.
    async fn forgot_password_verified(
        &self,
        forgot_id: &TokenId,
        reset_id: &TokenId,
        reset_token: &NewAccountResetToken,
    ) -> Result<(), StorageError>;

    // ==================== Password-change tokens ====================

    /// Creates a password-change token, replacing any existing token for
    /// the same account.
    async fn create_password_change_token(
        &self,
        token_id: &TokenId,
        token: &NewPasswordChangeToken,
    ) -> Result<(), StorageError>;

    /// Reads a password-change token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn password_change_token(
        &self,
        token_id: &TokenId,
    ) -> Result<PasswordChangeTokenRecord, StorageError>;

    /// Deletes a password-change token. Idempotent.
    async fn delete_password_change_token(&self, token_id: &TokenId)
    -> Result<(), StorageError>;

    // ==================== Account-reset tokens ====================

    /// Creates an account-reset token, replacing any existing token for the
    /// same account.
    async fn create_account_reset_token(
        &self,
        token_id: &TokenId,
        token: &NewAccountResetToken,
    ) -> Result<(), StorageError>;

    /// Reads an account-reset token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn account_reset_token(
        &self,
        token_id: &TokenId,
    ) -> Result<AccountResetTokenRecord, StorageError>;

    /// Deletes an account-reset token. Idempotent.
    async fn delete_account_reset_token(&self, token_id: &TokenId)
    -> Result<(), StorageError>;

    // ==================== Housekeeping ====================

    /// Liveness check; always succeeds for the in-memory backend.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Shuts the store down. Present for parity with networked backends;
    /// the in-memory backend holds nothing open.
    async fn close(&self) -> Result<(), StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
