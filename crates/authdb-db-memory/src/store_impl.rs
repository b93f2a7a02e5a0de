//! Implementation of the AuthStorage trait for InMemoryAuthStore.

use async_trait::async_trait;

use authdb_core::{DeviceId, TokenId, Uid};
use authdb_storage::{
    Account, AccountLock, AccountReset, AccountResetTokenRecord, AuthStorage, Device, DeviceUpdate,
    KeyFetchTokenRecord, NewAccount, NewAccountResetToken, NewKeyFetchToken,
    NewPasswordChangeToken, NewPasswordForgotToken, NewSessionToken, PasswordChangeTokenRecord,
    PasswordForgotTokenRecord, SessionEntry, SessionTokenRecord, SessionUpdate, StorageError,
};

use crate::store::InMemoryAuthStore;

#[async_trait]
impl AuthStorage for InMemoryAuthStore {
    async fn create_account(&self, uid: &Uid, account: &NewAccount) -> Result<(), StorageError> {
        InMemoryAuthStore::create_account(self, uid, account).await
    }

    async fn account(&self, uid: &Uid) -> Result<Account, StorageError> {
        InMemoryAuthStore::account(self, uid).await
    }

    async fn email_record(&self, email: &str) -> Result<Account, StorageError> {
        InMemoryAuthStore::email_record(self, email).await
    }

    async fn open_id_record(&self, open_id: &str) -> Result<Account, StorageError> {
        InMemoryAuthStore::open_id_record(self, open_id).await
    }

    async fn account_exists(&self, email: &str) -> Result<bool, StorageError> {
        InMemoryAuthStore::account_exists(self, email).await
    }

    async fn check_password(&self, uid: &Uid, verify_hash: &[u8]) -> Result<(), StorageError> {
        InMemoryAuthStore::check_password(self, uid, verify_hash).await
    }

    async fn verify_email(&self, uid: &Uid) -> Result<(), StorageError> {
        InMemoryAuthStore::verify_email(self, uid).await
    }

    async fn update_locale(&self, uid: &Uid, locale: &str) -> Result<(), StorageError> {
        InMemoryAuthStore::update_locale(self, uid, locale).await
    }

    async fn reset_account(&self, uid: &Uid, reset: &AccountReset) -> Result<(), StorageError> {
        InMemoryAuthStore::reset_account(self, uid, reset).await
    }

    async fn delete_account(&self, uid: &Uid) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_account(self, uid).await
    }

    async fn lock_account(&self, uid: &Uid, lock: &AccountLock) -> Result<(), StorageError> {
        InMemoryAuthStore::lock_account(self, uid, lock).await
    }

    async fn unlock_account(&self, uid: &Uid) -> Result<(), StorageError> {
        InMemoryAuthStore::unlock_account(self, uid).await
    }

    async fn unlock_code(&self, uid: &Uid) -> Result<Vec<u8>, StorageError> {
        InMemoryAuthStore::unlock_code(self, uid).await
    }

    async fn create_session_token(
        &self,
        token_id: &TokenId,
        token: &NewSessionToken,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::create_session_token(self, token_id, token).await
    }

    async fn session_token(&self, token_id: &TokenId) -> Result<SessionTokenRecord, StorageError> {
        InMemoryAuthStore::session_token(self, token_id).await
    }

    async fn update_session_token(
        &self,
        token_id: &TokenId,
        update: &SessionUpdate,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::update_session_token(self, token_id, update).await
    }

    async fn delete_session_token(&self, token_id: &TokenId) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_session_token(self, token_id).await
    }

    async fn sessions(&self, uid: &Uid) -> Result<Vec<SessionEntry>, StorageError> {
        InMemoryAuthStore::sessions(self, uid).await
    }

    async fn create_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
        info: &DeviceUpdate,
    ) -> Result<Device, StorageError> {
        InMemoryAuthStore::create_device(self, uid, device_id, info).await
    }

    async fn update_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
        info: &DeviceUpdate,
    ) -> Result<Device, StorageError> {
        InMemoryAuthStore::update_device(self, uid, device_id, info).await
    }

    async fn delete_device(&self, uid: &Uid, device_id: &DeviceId) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_device(self, uid, device_id).await
    }

    async fn account_devices(&self, uid: &Uid) -> Result<Vec<Device>, StorageError> {
        InMemoryAuthStore::account_devices(self, uid).await
    }

    async fn create_key_fetch_token(
        &self,
        token_id: &TokenId,
        token: &NewKeyFetchToken,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::create_key_fetch_token(self, token_id, token).await
    }

    async fn key_fetch_token(
        &self,
        token_id: &TokenId,
    ) -> Result<KeyFetchTokenRecord, StorageError> {
        InMemoryAuthStore::key_fetch_token(self, token_id).await
    }

    async fn delete_key_fetch_token(&self, token_id: &TokenId) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_key_fetch_token(self, token_id).await
    }

    async fn create_password_forgot_token(
        &self,
        token_id: &TokenId,
        token: &NewPasswordForgotToken,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::create_password_forgot_token(self, token_id, token).await
    }

    async fn password_forgot_token(
        &self,
        token_id: &TokenId,
    ) -> Result<PasswordForgotTokenRecord, StorageError> {
        InMemoryAuthStore::password_forgot_token(self, token_id).await
    }

    async fn update_password_forgot_token(
        &self,
        token_id: &TokenId,
        tries: u32,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::update_password_forgot_token(self, token_id, tries).await
    }

    async fn delete_password_forgot_token(&self, token_id: &TokenId) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_password_forgot_token(self, token_id).await
    }

    async fn forgot_password_verified(
        &self,
        forgot_id: &TokenId,
        reset_id: &TokenId,
        reset_token: &NewAccountResetToken,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::forgot_password_verified(self, forgot_id, reset_id, reset_token).await
    }

    async fn create_password_change_token(
        &self,
        token_id: &TokenId,
        token: &NewPasswordChangeToken,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::create_password_change_token(self, token_id, token).await
    }

    async fn password_change_token(
        &self,
        token_id: &TokenId,
    ) -> Result<PasswordChangeTokenRecord, StorageError> {
        InMemoryAuthStore::password_change_token(self, token_id).await
    }

    async fn delete_password_change_token(&self, token_id: &TokenId) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_password_change_token(self, token_id).await
    }

    async fn create_account_reset_token(
        &self,
        token_id: &TokenId,
        token: &NewAccountResetToken,
    ) -> Result<(), StorageError> {
        InMemoryAuthStore::create_account_reset_token(self, token_id, token).await
    }

    async fn account_reset_token(
        &self,
        token_id: &TokenId,
    ) -> Result<AccountResetTokenRecord, StorageError> {
        InMemoryAuthStore::account_reset_token(self, token_id).await
    }

    async fn delete_account_reset_token(&self, token_id: &TokenId) -> Result<(), StorageError> {
        InMemoryAuthStore::delete_account_reset_token(self, token_id).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        // Nothing to probe; the store is always live.
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        // Present for parity with networked backends; nothing is held open.
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
