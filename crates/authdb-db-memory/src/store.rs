use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use authdb_core::{DeviceId, Timestamp, TokenId, Uid, UserAgentInfo};
use authdb_storage::{
    Account, AccountLock, AccountReset, AccountResetTokenRecord, CALLBACK_PUBLIC_KEY_LEN, Device,
    DeviceUpdate, KeyFetchTokenRecord, NewAccount, NewAccountResetToken, NewKeyFetchToken,
    NewPasswordChangeToken, NewPasswordForgotToken, NewSessionToken, PasswordChangeTokenRecord,
    PasswordForgotTokenRecord, SessionEntry, SessionTokenRecord, SessionUpdate, StorageError,
    normalize_callback_public_key, normalize_email,
};

use crate::factory::StoreOptions;
use crate::transaction::{StoreTransaction, Undo};

/// Record-kind labels used in NotFound/Duplicate errors.
pub(crate) mod kind {
    pub const ACCOUNT: &str = "account";
    pub const DEVICE: &str = "device";
    pub const SESSION_TOKEN: &str = "sessionToken";
    pub const KEY_FETCH_TOKEN: &str = "keyFetchToken";
    pub const PASSWORD_FORGOT_TOKEN: &str = "passwordForgotToken";
    pub const PASSWORD_CHANGE_TOKEN: &str = "passwordChangeToken";
    pub const ACCOUNT_RESET_TOKEN: &str = "accountResetToken";
    pub const UNLOCK_CODE: &str = "unlockCode";
}

// =============================================================================
// Rows
// =============================================================================

/// Stored account row. The only place the verify hash lives; every read goes
/// through [`AccountRow::view`], which strips it.
#[derive(Debug, Clone)]
pub(crate) struct AccountRow {
    pub(crate) normalized_email: String,
    pub(crate) email: String,
    pub(crate) open_id: Option<String>,
    pub(crate) verify_hash: Vec<u8>,
    pub(crate) auth_salt: Vec<u8>,
    pub(crate) wrap_wrap_kb: Vec<u8>,
    pub(crate) verifier_set_at: Timestamp,
    pub(crate) verifier_version: u32,
    pub(crate) email_verified: bool,
    pub(crate) email_code: Vec<u8>,
    pub(crate) locale: Option<String>,
    pub(crate) created_at: Timestamp,
    pub(crate) locked_at: Option<Timestamp>,
    pub(crate) devices: HashMap<DeviceId, DeviceRow>,
}

impl AccountRow {
    /// Filtered view: everything except the verify hash.
    fn view(&self, uid: Uid) -> Account {
        Account {
            uid,
            normalized_email: self.normalized_email.clone(),
            email: self.email.clone(),
            open_id: self.open_id.clone(),
            auth_salt: self.auth_salt.clone(),
            wrap_wrap_kb: self.wrap_wrap_kb.clone(),
            verifier_set_at: self.verifier_set_at,
            verifier_version: self.verifier_version,
            email_verified: self.email_verified,
            email_code: self.email_code.clone(),
            locale: self.locale.clone(),
            created_at: self.created_at,
            locked_at: self.locked_at,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DeviceRow {
    pub(crate) session_token_id: Option<TokenId>,
    pub(crate) name: Option<String>,
    pub(crate) device_type: Option<String>,
    pub(crate) created_at: Option<Timestamp>,
    pub(crate) callback_url: Option<String>,
    pub(crate) callback_public_key: Vec<u8>,
    pub(crate) ua: UserAgentInfo,
    pub(crate) last_access_time: Option<Timestamp>,
}

impl DeviceRow {
    /// Fresh row for first creation: every merge field unset, the callback
    /// key at its all-zero sentinel.
    fn empty() -> Self {
        Self {
            session_token_id: None,
            name: None,
            device_type: None,
            created_at: None,
            callback_url: None,
            callback_public_key: vec![0u8; CALLBACK_PUBLIC_KEY_LEN],
            ua: UserAgentInfo::default(),
            last_access_time: None,
        }
    }

    fn view(&self, uid: Uid, id: DeviceId) -> Device {
        Device {
            id,
            uid,
            session_token_id: self.session_token_id,
            name: self.name.clone(),
            device_type: self.device_type.clone(),
            created_at: self.created_at,
            callback_url: self.callback_url.clone(),
            callback_public_key: self.callback_public_key.clone(),
            ua: self.ua.clone(),
            last_access_time: self.last_access_time,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SessionTokenRow {
    pub(crate) token_data: Vec<u8>,
    pub(crate) uid: Uid,
    pub(crate) created_at: Timestamp,
    pub(crate) last_access_time: Timestamp,
    pub(crate) ua: UserAgentInfo,
    pub(crate) device_id: Option<DeviceId>,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyFetchTokenRow {
    pub(crate) auth_key: Vec<u8>,
    pub(crate) uid: Uid,
    pub(crate) key_bundle: Vec<u8>,
    pub(crate) created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub(crate) struct PasswordForgotTokenRow {
    pub(crate) token_data: Vec<u8>,
    pub(crate) uid: Uid,
    pub(crate) pass_code: Vec<u8>,
    pub(crate) tries: u32,
    pub(crate) created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub(crate) struct PasswordChangeTokenRow {
    pub(crate) token_data: Vec<u8>,
    pub(crate) uid: Uid,
    pub(crate) created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub(crate) struct AccountResetTokenRow {
    pub(crate) token_data: Vec<u8>,
    pub(crate) uid: Uid,
    pub(crate) created_at: Timestamp,
}

/// A row that carries its owning account identifier, making it eligible for
/// the generic owner cascade.
pub(crate) trait OwnedRow {
    fn owner(&self) -> &Uid;
}

impl OwnedRow for SessionTokenRow {
    fn owner(&self) -> &Uid {
        &self.uid
    }
}

impl OwnedRow for KeyFetchTokenRow {
    fn owner(&self) -> &Uid {
        &self.uid
    }
}

impl OwnedRow for PasswordForgotTokenRow {
    fn owner(&self) -> &Uid {
        &self.uid
    }
}

impl OwnedRow for PasswordChangeTokenRow {
    fn owner(&self) -> &Uid {
        &self.uid
    }
}

impl OwnedRow for AccountResetTokenRow {
    fn owner(&self) -> &Uid {
        &self.uid
    }
}

/// Removes every row owned by `uid` from one table, returning the removed
/// entries. Shared by the reset and delete cascades and by the
/// at-most-one-per-account replacement on workflow-token creation.
pub(crate) fn purge_owned<K, R>(table: &mut HashMap<K, R>, uid: &Uid) -> Vec<(K, R)>
where
    K: Eq + Hash + Copy,
    R: OwnedRow,
{
    let keys: Vec<K> = table
        .iter()
        .filter(|(_, row)| row.owner() == uid)
        .map(|(key, _)| *key)
        .collect();
    keys.into_iter()
        .filter_map(|key| table.remove(&key).map(|row| (key, row)))
        .collect()
}

// =============================================================================
// Tables
// =============================================================================

/// All seven collections, mutated only while holding the store's write lock.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) accounts: HashMap<Uid, AccountRow>,
    /// Normalized email -> uid.
    pub(crate) emails: HashMap<String, Uid>,
    /// External identity-provider id -> uid.
    pub(crate) open_ids: HashMap<String, Uid>,
    pub(crate) session_tokens: HashMap<TokenId, SessionTokenRow>,
    pub(crate) key_fetch_tokens: HashMap<TokenId, KeyFetchTokenRow>,
    pub(crate) password_forgot_tokens: HashMap<TokenId, PasswordForgotTokenRow>,
    pub(crate) password_change_tokens: HashMap<TokenId, PasswordChangeTokenRow>,
    pub(crate) account_reset_tokens: HashMap<TokenId, AccountResetTokenRow>,
    pub(crate) unlock_codes: HashMap<Uid, Vec<u8>>,
}

impl Tables {
    fn with_capacity(accounts: usize) -> Self {
        Self {
            accounts: HashMap::with_capacity(accounts),
            emails: HashMap::with_capacity(accounts),
            ..Self::default()
        }
    }

    /// Validates the session↔device back-references for one account before a
    /// cascade touches them. An inconsistent pair is an unrecoverable
    /// integrity violation.
    fn check_device_links(&self, uid: &Uid) -> Result<(), StorageError> {
        let Some(account) = self.accounts.get(uid) else {
            return Ok(());
        };
        for (token_id, session) in self.session_tokens.iter() {
            if session.uid != *uid {
                continue;
            }
            if let Some(device_id) = session.device_id {
                let linked_back = account
                    .devices
                    .get(&device_id)
                    .is_some_and(|device| device.session_token_id == Some(*token_id));
                if !linked_back {
                    return Err(StorageError::integrity(format!(
                        "session token {token_id} names device {device_id} which does not \
                         reference it back"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Removes every token row and the unlock code owned by `uid`.
    fn cascade_tokens(&mut self, uid: &Uid) -> usize {
        let mut removed = purge_owned(&mut self.session_tokens, uid).len();
        removed += purge_owned(&mut self.key_fetch_tokens, uid).len();
        removed += purge_owned(&mut self.password_forgot_tokens, uid).len();
        removed += purge_owned(&mut self.password_change_tokens, uid).len();
        removed += purge_owned(&mut self.account_reset_tokens, uid).len();
        if self.unlock_codes.remove(uid).is_some() {
            removed += 1;
        }
        removed
    }
}

// =============================================================================
// Store
// =============================================================================

/// In-memory AuthDB storage backend.
///
/// One [`Tables`] value behind a single `tokio::sync::RwLock`; every
/// operation acquires the lock exactly once for its whole duration, so
/// multi-table mutations (cascades, device bindings, the composite
/// forgot-password workflow) are observably atomic. Instances are fully
/// independent; there is no process-wide state.
#[derive(Debug)]
pub struct InMemoryAuthStore {
    pub(crate) tables: Arc<RwLock<Tables>>,
    _options: StoreOptions,
}

impl InMemoryAuthStore {
    /// Creates a new empty store with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Creates a new empty store with the given options.
    #[must_use]
    pub fn with_options(options: StoreOptions) -> Self {
        let tables = match options.preallocate_accounts {
            Some(capacity) => Tables::with_capacity(capacity),
            None => Tables::default(),
        };
        Self {
            tables: Arc::new(RwLock::new(tables)),
            _options: options,
        }
    }

    // ==================== Accounts ====================

    pub(crate) async fn create_account(
        &self,
        uid: &Uid,
        account: &NewAccount,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;

        if tables.accounts.contains_key(uid) {
            return Err(StorageError::duplicate(kind::ACCOUNT, uid));
        }
        let normalized_email = normalize_email(&account.email);
        if tables.emails.contains_key(&normalized_email) {
            return Err(StorageError::duplicate(kind::ACCOUNT, &normalized_email));
        }
        if let Some(open_id) = &account.open_id {
            if tables.open_ids.contains_key(open_id) {
                return Err(StorageError::duplicate(kind::ACCOUNT, open_id));
            }
        }

        tables.emails.insert(normalized_email.clone(), *uid);
        if let Some(open_id) = &account.open_id {
            tables.open_ids.insert(open_id.clone(), *uid);
        }
        tables.accounts.insert(
            *uid,
            AccountRow {
                normalized_email,
                email: account.email.clone(),
                open_id: account.open_id.clone(),
                verify_hash: account.verify_hash.clone(),
                auth_salt: account.auth_salt.clone(),
                wrap_wrap_kb: account.wrap_wrap_kb.clone(),
                verifier_set_at: account.verifier_set_at,
                verifier_version: account.verifier_version,
                email_verified: account.email_verified,
                email_code: account.email_code.clone(),
                locale: account.locale.clone(),
                created_at: account.created_at,
                locked_at: None,
                devices: HashMap::new(),
            },
        );
        debug!(uid = %uid, "account created");
        Ok(())
    }

    pub(crate) async fn account(&self, uid: &Uid) -> Result<Account, StorageError> {
        let tables = self.tables.read().await;
        tables
            .accounts
            .get(uid)
            .map(|row| row.view(*uid))
            .ok_or_else(|| StorageError::not_found(kind::ACCOUNT, uid))
    }

    pub(crate) async fn email_record(&self, email: &str) -> Result<Account, StorageError> {
        let tables = self.tables.read().await;
        let normalized = normalize_email(email);
        let uid = tables
            .emails
            .get(&normalized)
            .ok_or_else(|| StorageError::not_found(kind::ACCOUNT, &normalized))?;
        let row = tables.accounts.get(uid).ok_or_else(|| {
            StorageError::integrity(format!("email index names missing account {uid}"))
        })?;
        Ok(row.view(*uid))
    }

    pub(crate) async fn open_id_record(&self, open_id: &str) -> Result<Account, StorageError> {
        let tables = self.tables.read().await;
        let uid = tables
            .open_ids
            .get(open_id)
            .ok_or_else(|| StorageError::not_found(kind::ACCOUNT, open_id))?;
        let row = tables.accounts.get(uid).ok_or_else(|| {
            StorageError::integrity(format!("openId index names missing account {uid}"))
        })?;
        Ok(row.view(*uid))
    }

    pub(crate) async fn account_exists(&self, email: &str) -> Result<bool, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.emails.contains_key(&normalize_email(email)))
    }

    pub(crate) async fn check_password(
        &self,
        uid: &Uid,
        verify_hash: &[u8],
    ) -> Result<(), StorageError> {
        let tables = self.tables.read().await;
        // Absent account and hash mismatch collapse into the same error so
        // callers cannot probe for account existence.
        match tables.accounts.get(uid) {
            Some(row) if row.verify_hash == verify_hash => Ok(()),
            _ => Err(StorageError::incorrect_password()),
        }
    }

    pub(crate) async fn verify_email(&self, uid: &Uid) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.accounts.get_mut(uid) {
            row.email_verified = true;
        }
        Ok(())
    }

    pub(crate) async fn update_locale(&self, uid: &Uid, locale: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .accounts
            .get_mut(uid)
            .ok_or_else(|| StorageError::not_found(kind::ACCOUNT, uid))?;
        row.locale = Some(locale.to_string());
        Ok(())
    }

    pub(crate) async fn reset_account(
        &self,
        uid: &Uid,
        reset: &AccountReset,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(uid) {
            return Err(StorageError::not_found(kind::ACCOUNT, uid));
        }
        tables.check_device_links(uid)?;

        let removed = tables.cascade_tokens(uid);
        let row = tables
            .accounts
            .get_mut(uid)
            .ok_or_else(|| StorageError::internal("account row vanished during reset"))?;
        row.devices.clear();
        row.verify_hash = reset.verify_hash.clone();
        row.auth_salt = reset.auth_salt.clone();
        row.wrap_wrap_kb = reset.wrap_wrap_kb.clone();
        row.verifier_set_at = reset.verifier_set_at;
        row.verifier_version = reset.verifier_version;
        debug!(uid = %uid, removed, "account reset");
        Ok(())
    }

    pub(crate) async fn delete_account(&self, uid: &Uid) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.check_device_links(uid)?;
        let Some(row) = tables.accounts.remove(uid) else {
            return Err(StorageError::not_found(kind::ACCOUNT, uid));
        };
        tables.emails.remove(&row.normalized_email);
        if let Some(open_id) = &row.open_id {
            tables.open_ids.remove(open_id);
        }
        let removed = tables.cascade_tokens(uid);
        debug!(uid = %uid, removed, "account deleted");
        Ok(())
    }

    // ==================== Account lock ====================

    pub(crate) async fn lock_account(
        &self,
        uid: &Uid,
        lock: &AccountLock,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .accounts
            .get_mut(uid)
            .ok_or_else(|| StorageError::not_found(kind::ACCOUNT, uid))?;
        row.locked_at = Some(lock.locked_at);
        tables.unlock_codes.insert(*uid, lock.unlock_code.clone());
        debug!(uid = %uid, "account locked");
        Ok(())
    }

    pub(crate) async fn unlock_account(&self, uid: &Uid) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        // Unlocking a nonexistent account is a no-op, not an error.
        if let Some(row) = tables.accounts.get_mut(uid) {
            row.locked_at = None;
        }
        tables.unlock_codes.remove(uid);
        Ok(())
    }

    pub(crate) async fn unlock_code(&self, uid: &Uid) -> Result<Vec<u8>, StorageError> {
        let tables = self.tables.read().await;
        tables
            .unlock_codes
            .get(uid)
            .cloned()
            .ok_or_else(|| StorageError::not_found(kind::UNLOCK_CODE, uid))
    }

    // ==================== Session tokens ====================

    pub(crate) async fn create_session_token(
        &self,
        token_id: &TokenId,
        token: &NewSessionToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.session_tokens.contains_key(token_id) {
            return Err(StorageError::duplicate(kind::SESSION_TOKEN, token_id));
        }
        tables.session_tokens.insert(
            *token_id,
            SessionTokenRow {
                token_data: token.token_data.clone(),
                uid: token.uid,
                created_at: token.created_at,
                last_access_time: token.created_at,
                ua: token.ua.clone(),
                device_id: None,
            },
        );
        Ok(())
    }

    pub(crate) async fn session_token(
        &self,
        token_id: &TokenId,
    ) -> Result<SessionTokenRecord, StorageError> {
        let tables = self.tables.read().await;
        let row = tables
            .session_tokens
            .get(token_id)
            .ok_or_else(|| StorageError::not_found(kind::SESSION_TOKEN, token_id))?;
        let account = tables.accounts.get(&row.uid).ok_or_else(|| {
            StorageError::integrity(format!("session token owned by missing account {}", row.uid))
        })?;
        Ok(SessionTokenRecord {
            token_data: row.token_data.clone(),
            uid: row.uid,
            created_at: row.created_at,
            last_access_time: row.last_access_time,
            ua: row.ua.clone(),
            device_id: row.device_id,
            email_verified: account.email_verified,
            email: account.email.clone(),
            email_code: account.email_code.clone(),
            verifier_set_at: account.verifier_set_at,
            locale: account.locale.clone(),
            account_created_at: account.created_at,
        })
    }

    pub(crate) async fn update_session_token(
        &self,
        token_id: &TokenId,
        update: &SessionUpdate,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .session_tokens
            .get_mut(token_id)
            .ok_or_else(|| StorageError::not_found(kind::SESSION_TOKEN, token_id))?;
        row.ua = update.ua.clone();
        row.last_access_time = update.last_access_time;
        Ok(())
    }

    pub(crate) async fn delete_session_token(&self, token_id: &TokenId) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        // Idempotent; a device holding a forward reference to this token
        // keeps it (the reference is weak and may dangle).
        tables.session_tokens.remove(token_id);
        Ok(())
    }

    pub(crate) async fn sessions(&self, uid: &Uid) -> Result<Vec<SessionEntry>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .session_tokens
            .iter()
            .filter(|(_, row)| row.uid == *uid)
            .map(|(token_id, row)| SessionEntry {
                token_id: *token_id,
                uid: row.uid,
                created_at: row.created_at,
                last_access_time: row.last_access_time,
                ua: row.ua.clone(),
            })
            .collect())
    }

    // ==================== Devices ====================

    pub(crate) async fn create_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
        info: &DeviceUpdate,
    ) -> Result<Device, StorageError> {
        let mut tables = self.tables.write().await;
        upsert_device(&mut tables, uid, device_id, info, DeviceWrite::Create)
    }

    pub(crate) async fn update_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
        info: &DeviceUpdate,
    ) -> Result<Device, StorageError> {
        let mut tables = self.tables.write().await;
        upsert_device(&mut tables, uid, device_id, info, DeviceWrite::Update)
    }

    pub(crate) async fn delete_device(
        &self,
        uid: &Uid,
        device_id: &DeviceId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let Tables {
            accounts,
            session_tokens,
            ..
        } = &mut *tables;
        let account = accounts
            .get_mut(uid)
            .ok_or_else(|| StorageError::not_found(kind::DEVICE, device_id))?;
        let Some(row) = account.devices.remove(device_id) else {
            return Err(StorageError::not_found(kind::DEVICE, device_id));
        };
        if let Some(session_token_id) = row.session_token_id {
            session_tokens.remove(&session_token_id);
        }
        debug!(uid = %uid, device = %device_id, "device deleted");
        Ok(())
    }

    pub(crate) async fn account_devices(&self, uid: &Uid) -> Result<Vec<Device>, StorageError> {
        let tables = self.tables.read().await;
        // A missing account has no devices; this is not an error.
        Ok(tables
            .accounts
            .get(uid)
            .map(|account| {
                account
                    .devices
                    .iter()
                    .map(|(device_id, row)| row.view(*uid, *device_id))
                    .collect()
            })
            .unwrap_or_default())
    }

    // ==================== Key-fetch tokens ====================

    pub(crate) async fn create_key_fetch_token(
        &self,
        token_id: &TokenId,
        token: &NewKeyFetchToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.key_fetch_tokens.contains_key(token_id) {
            return Err(StorageError::duplicate(kind::KEY_FETCH_TOKEN, token_id));
        }
        tables.key_fetch_tokens.insert(
            *token_id,
            KeyFetchTokenRow {
                auth_key: token.auth_key.clone(),
                uid: token.uid,
                key_bundle: token.key_bundle.clone(),
                created_at: token.created_at,
            },
        );
        Ok(())
    }

    pub(crate) async fn key_fetch_token(
        &self,
        token_id: &TokenId,
    ) -> Result<KeyFetchTokenRecord, StorageError> {
        let tables = self.tables.read().await;
        let row = tables
            .key_fetch_tokens
            .get(token_id)
            .ok_or_else(|| StorageError::not_found(kind::KEY_FETCH_TOKEN, token_id))?;
        let account = tables.accounts.get(&row.uid).ok_or_else(|| {
            StorageError::integrity(format!(
                "key-fetch token owned by missing account {}",
                row.uid
            ))
        })?;
        Ok(KeyFetchTokenRecord {
            auth_key: row.auth_key.clone(),
            uid: row.uid,
            key_bundle: row.key_bundle.clone(),
            created_at: row.created_at,
            email_verified: account.email_verified,
            verifier_set_at: account.verifier_set_at,
        })
    }

    pub(crate) async fn delete_key_fetch_token(
        &self,
        token_id: &TokenId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.key_fetch_tokens.remove(token_id);
        Ok(())
    }

    // ==================== Password-forgot tokens ====================

    pub(crate) async fn create_password_forgot_token(
        &self,
        token_id: &TokenId,
        token: &NewPasswordForgotToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.password_forgot_tokens.contains_key(token_id) {
            return Err(StorageError::duplicate(
                kind::PASSWORD_FORGOT_TOKEN,
                token_id,
            ));
        }
        // At most one live forgot token per account.
        purge_owned(&mut tables.password_forgot_tokens, &token.uid);
        tables.password_forgot_tokens.insert(
            *token_id,
            PasswordForgotTokenRow {
                token_data: token.token_data.clone(),
                uid: token.uid,
                pass_code: token.pass_code.clone(),
                tries: token.tries,
                created_at: token.created_at,
            },
        );
        Ok(())
    }

    pub(crate) async fn password_forgot_token(
        &self,
        token_id: &TokenId,
    ) -> Result<PasswordForgotTokenRecord, StorageError> {
        let tables = self.tables.read().await;
        let row = tables
            .password_forgot_tokens
            .get(token_id)
            .ok_or_else(|| StorageError::not_found(kind::PASSWORD_FORGOT_TOKEN, token_id))?;
        let account = tables.accounts.get(&row.uid).ok_or_else(|| {
            StorageError::integrity(format!(
                "password-forgot token owned by missing account {}",
                row.uid
            ))
        })?;
        Ok(PasswordForgotTokenRecord {
            token_data: row.token_data.clone(),
            uid: row.uid,
            pass_code: row.pass_code.clone(),
            tries: row.tries,
            created_at: row.created_at,
            email: account.email.clone(),
            verifier_set_at: account.verifier_set_at,
        })
    }

    pub(crate) async fn update_password_forgot_token(
        &self,
        token_id: &TokenId,
        tries: u32,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .password_forgot_tokens
            .get_mut(token_id)
            .ok_or_else(|| StorageError::not_found(kind::PASSWORD_FORGOT_TOKEN, token_id))?;
        row.tries = tries;
        Ok(())
    }

    pub(crate) async fn delete_password_forgot_token(
        &self,
        token_id: &TokenId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.password_forgot_tokens.remove(token_id);
        Ok(())
    }

    pub(crate) async fn forgot_password_verified(
        &self,
        forgot_id: &TokenId,
        reset_id: &TokenId,
        reset_token: &NewAccountResetToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let mut tx = StoreTransaction::new();
        match apply_forgot_password_verified(&mut tables, &mut tx, forgot_id, reset_id, reset_token)
        {
            Ok(uid) => {
                tx.commit();
                debug!(uid = %uid, "forgot-password workflow completed");
                Ok(())
            }
            Err(err) => {
                tx.rollback(&mut tables);
                Err(err)
            }
        }
    }

    // ==================== Password-change tokens ====================

    pub(crate) async fn create_password_change_token(
        &self,
        token_id: &TokenId,
        token: &NewPasswordChangeToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        // At most one live change token per account.
        purge_owned(&mut tables.password_change_tokens, &token.uid);
        tables.password_change_tokens.insert(
            *token_id,
            PasswordChangeTokenRow {
                token_data: token.token_data.clone(),
                uid: token.uid,
                created_at: token.created_at,
            },
        );
        Ok(())
    }

    pub(crate) async fn password_change_token(
        &self,
        token_id: &TokenId,
    ) -> Result<PasswordChangeTokenRecord, StorageError> {
        let tables = self.tables.read().await;
        let row = tables
            .password_change_tokens
            .get(token_id)
            .ok_or_else(|| StorageError::not_found(kind::PASSWORD_CHANGE_TOKEN, token_id))?;
        let account = tables.accounts.get(&row.uid).ok_or_else(|| {
            StorageError::integrity(format!(
                "password-change token owned by missing account {}",
                row.uid
            ))
        })?;
        Ok(PasswordChangeTokenRecord {
            token_data: row.token_data.clone(),
            uid: row.uid,
            created_at: row.created_at,
            email: account.email.clone(),
            verifier_set_at: account.verifier_set_at,
        })
    }

    pub(crate) async fn delete_password_change_token(
        &self,
        token_id: &TokenId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.password_change_tokens.remove(token_id);
        Ok(())
    }

    // ==================== Account-reset tokens ====================

    pub(crate) async fn create_account_reset_token(
        &self,
        token_id: &TokenId,
        token: &NewAccountResetToken,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        // At most one live reset token per account.
        purge_owned(&mut tables.account_reset_tokens, &token.uid);
        tables.account_reset_tokens.insert(
            *token_id,
            AccountResetTokenRow {
                token_data: token.token_data.clone(),
                uid: token.uid,
                created_at: token.created_at,
            },
        );
        Ok(())
    }

    pub(crate) async fn account_reset_token(
        &self,
        token_id: &TokenId,
    ) -> Result<AccountResetTokenRecord, StorageError> {
        let tables = self.tables.read().await;
        let row = tables
            .account_reset_tokens
            .get(token_id)
            .ok_or_else(|| StorageError::not_found(kind::ACCOUNT_RESET_TOKEN, token_id))?;
        let account = tables.accounts.get(&row.uid).ok_or_else(|| {
            StorageError::integrity(format!(
                "account-reset token owned by missing account {}",
                row.uid
            ))
        })?;
        Ok(AccountResetTokenRecord {
            token_data: row.token_data.clone(),
            uid: row.uid,
            created_at: row.created_at,
            email: account.email.clone(),
            verifier_set_at: account.verifier_set_at,
        })
    }

    pub(crate) async fn delete_account_reset_token(
        &self,
        token_id: &TokenId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.account_reset_tokens.remove(token_id);
        Ok(())
    }
}

impl Default for InMemoryAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Internal mutation paths
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceWrite {
    Create,
    Update,
}

/// Single mutation path for device creation and update: merge semantics plus
/// the session↔device relation, both sides updated or neither.
fn upsert_device(
    tables: &mut Tables,
    uid: &Uid,
    device_id: &DeviceId,
    info: &DeviceUpdate,
    mode: DeviceWrite,
) -> Result<Device, StorageError> {
    let Tables {
        accounts,
        session_tokens,
        ..
    } = tables;

    let Some(account) = accounts.get_mut(uid) else {
        // An update on a missing account is a missing device, not a missing
        // account: the device cannot exist.
        return Err(match mode {
            DeviceWrite::Create => StorageError::not_found(kind::ACCOUNT, uid),
            DeviceWrite::Update => StorageError::not_found(kind::DEVICE, device_id),
        });
    };

    let existing = account.devices.get(device_id);
    match mode {
        DeviceWrite::Create if existing.is_some() => {
            return Err(StorageError::duplicate(kind::DEVICE, device_id));
        }
        DeviceWrite::Update if existing.is_none() => {
            return Err(StorageError::not_found(kind::DEVICE, device_id));
        }
        _ => {}
    }

    let mut row = existing.cloned().unwrap_or_else(DeviceRow::empty);
    if let Some(name) = &info.name {
        row.name = Some(name.clone());
    }
    if let Some(device_type) = &info.device_type {
        row.device_type = Some(device_type.clone());
    }
    if let Some(created_at) = info.created_at {
        row.created_at = Some(created_at);
    }
    if let Some(callback_url) = &info.callback_url {
        row.callback_url = Some(callback_url.clone());
    }
    if let Some(callback_public_key) = &info.callback_public_key {
        row.callback_public_key = normalize_callback_public_key(callback_public_key);
    }

    if let Some(new_session_id) = info.session_token_id {
        // A session token cannot serve two devices simultaneously.
        if let Some(session) = session_tokens.get(&new_session_id) {
            if session.device_id.is_some_and(|bound| bound != *device_id) {
                return Err(StorageError::duplicate(kind::SESSION_TOKEN, new_session_id));
            }
        }
        // Rebinding: clear the previously held token's back-reference first.
        if let Some(old_session_id) = row.session_token_id {
            if old_session_id != new_session_id {
                if let Some(old_session) = session_tokens.get_mut(&old_session_id) {
                    old_session.device_id = None;
                }
            }
        }
        row.session_token_id = Some(new_session_id);
        if let Some(session) = session_tokens.get_mut(&new_session_id) {
            row.ua = session.ua.clone();
            row.last_access_time = Some(session.last_access_time);
            session.device_id = Some(*device_id);
        }
    }
    // Payload without a session token id: the existing binding is retained.

    account.devices.insert(*device_id, row.clone());
    Ok(row.view(*uid, *device_id))
}

/// The composite forgot-password workflow, executed against `tables` while
/// recording undo entries in `tx`. Returns the affected account's uid.
fn apply_forgot_password_verified(
    tables: &mut Tables,
    tx: &mut StoreTransaction,
    forgot_id: &TokenId,
    reset_id: &TokenId,
    reset_token: &NewAccountResetToken,
) -> Result<Uid, StorageError> {
    let prior_forgot = tables.password_forgot_tokens.remove(forgot_id);
    tx.record(Undo::PasswordForgotToken {
        id: *forgot_id,
        prior: prior_forgot.clone(),
    });
    let forgot = prior_forgot
        .ok_or_else(|| StorageError::not_found(kind::PASSWORD_FORGOT_TOKEN, forgot_id))?;
    let uid = forgot.uid;

    // Install the reset token, replacing any prior one for the account.
    for (id, row) in purge_owned(&mut tables.account_reset_tokens, &reset_token.uid) {
        tx.record(Undo::AccountResetToken {
            id,
            prior: Some(row),
        });
    }
    tx.record(Undo::AccountResetToken {
        id: *reset_id,
        prior: None,
    });
    tables.account_reset_tokens.insert(
        *reset_id,
        AccountResetTokenRow {
            token_data: reset_token.token_data.clone(),
            uid: reset_token.uid,
            created_at: reset_token.created_at,
        },
    );

    // Mark the email verified and clear the lock state; both tolerate a
    // missing account the same way the standalone operations do.
    if let Some(account) = tables.accounts.get_mut(&uid) {
        tx.record(Undo::AccountState {
            uid,
            email_verified: account.email_verified,
            locked_at: account.locked_at,
        });
        account.email_verified = true;
        account.locked_at = None;
    }
    let prior_code = tables.unlock_codes.remove(&uid);
    tx.record(Undo::UnlockCode {
        uid,
        prior: prior_code,
    });

    Ok(uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn uid(byte: u8) -> Uid {
        Uid::from_bytes([byte; 16])
    }

    fn token_id(byte: u8) -> TokenId {
        TokenId::from_bytes([byte; 32])
    }

    fn device_id(byte: u8) -> DeviceId {
        DeviceId::from_bytes([byte; 16])
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::from_str(s).unwrap()
    }

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            open_id: None,
            verify_hash: vec![0x11; 32],
            auth_salt: vec![0x22; 32],
            wrap_wrap_kb: vec![0x33; 32],
            verifier_set_at: ts("2024-02-01T00:00:00Z"),
            verifier_version: 1,
            email_verified: false,
            email_code: vec![0x44; 16],
            locale: Some("en-US".to_string()),
            created_at: ts("2024-01-01T00:00:00Z"),
        }
    }

    fn new_session(owner: Uid) -> NewSessionToken {
        NewSessionToken {
            token_data: vec![0x55; 32],
            uid: owner,
            created_at: ts("2024-03-01T08:00:00Z"),
            ua: UserAgentInfo {
                browser: Some("Firefox".to_string()),
                browser_version: Some("121.0".to_string()),
                os: Some("Linux".to_string()),
                os_version: None,
                device_type: Some("desktop".to_string()),
            },
        }
    }

    fn new_forgot(owner: Uid) -> NewPasswordForgotToken {
        NewPasswordForgotToken {
            token_data: vec![0x66; 32],
            uid: owner,
            pass_code: vec![0x77; 16],
            tries: 3,
            created_at: ts("2024-03-02T00:00:00Z"),
        }
    }

    fn new_reset(owner: Uid) -> NewAccountResetToken {
        NewAccountResetToken {
            token_data: vec![0x88; 32],
            uid: owner,
            created_at: ts("2024-03-03T00:00:00Z"),
        }
    }

    async fn store_with_account(byte: u8, email: &str) -> (InMemoryAuthStore, Uid) {
        let store = InMemoryAuthStore::new();
        let owner = uid(byte);
        store.create_account(&owner, &new_account(email)).await.unwrap();
        (store, owner)
    }

    // ==================== Accounts ====================

    #[tokio::test]
    async fn test_create_and_read_account() {
        let (store, owner) = store_with_account(1, "User@Example.COM").await;

        let account = store.account(&owner).await.unwrap();
        assert_eq!(account.uid, owner);
        assert_eq!(account.email, "User@Example.COM");
        assert_eq!(account.normalized_email, "user@example.com");
        assert_eq!(account.auth_salt, vec![0x22; 32]);
        assert!(!account.email_verified);
        assert!(account.locked_at.is_none());

        // The same filtered view is reachable through the email index,
        // regardless of casing.
        let by_email = store.email_record("uSeR@eXaMpLe.CoM").await.unwrap();
        assert_eq!(by_email, account);
    }

    #[tokio::test]
    async fn test_account_lookup_not_found() {
        let store = InMemoryAuthStore::new();
        let err = store.account(&uid(9)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.email_record("missing@example.com").await.unwrap_err().is_not_found());
        assert!(store.open_id_record("idp|123").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_account_duplicate_uid() {
        let (store, owner) = store_with_account(1, "a@example.com").await;
        let err = store
            .create_account(&owner, &new_account("b@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_create_account_duplicate_email_case_insensitive() {
        let (store, _) = store_with_account(1, "dup@example.com").await;
        let err = store
            .create_account(&uid(2), &new_account("DUP@EXAMPLE.COM"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
        // The failed create must not have left a row behind.
        assert!(store.account(&uid(2)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_account_duplicate_open_id() {
        let store = InMemoryAuthStore::new();
        let mut first = new_account("first@example.com");
        first.open_id = Some("idp|abc".to_string());
        store.create_account(&uid(1), &first).await.unwrap();

        let mut second = new_account("second@example.com");
        second.open_id = Some("idp|abc".to_string());
        let err = store.create_account(&uid(2), &second).await.unwrap_err();
        assert!(err.is_duplicate());

        let found = store.open_id_record("idp|abc").await.unwrap();
        assert_eq!(found.uid, uid(1));
    }

    #[tokio::test]
    async fn test_account_exists() {
        let (store, _) = store_with_account(1, "here@example.com").await;
        assert!(store.account_exists("HERE@example.com").await.unwrap());
        assert!(!store.account_exists("gone@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_password() {
        let (store, owner) = store_with_account(1, "pw@example.com").await;

        store.check_password(&owner, &[0x11; 32]).await.unwrap();

        let wrong = store.check_password(&owner, &[0xff; 32]).await.unwrap_err();
        assert!(wrong.is_incorrect_password());

        // A nonexistent account yields the same error, not NotFound.
        let absent = store.check_password(&uid(9), &[0x11; 32]).await.unwrap_err();
        assert!(absent.is_incorrect_password());
        assert_eq!(wrong.to_string(), absent.to_string());
    }

    #[tokio::test]
    async fn test_verify_email() {
        let (store, owner) = store_with_account(1, "v@example.com").await;
        store.verify_email(&owner).await.unwrap();
        assert!(store.account(&owner).await.unwrap().email_verified);

        // Silent no-op for a missing account.
        store.verify_email(&uid(9)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_locale() {
        let (store, owner) = store_with_account(1, "l@example.com").await;
        store.update_locale(&owner, "fr-FR").await.unwrap();
        assert_eq!(store.account(&owner).await.unwrap().locale.as_deref(), Some("fr-FR"));

        assert!(store.update_locale(&uid(9), "de").await.unwrap_err().is_not_found());
    }

    // ==================== Lock / unlock ====================

    #[tokio::test]
    async fn test_lock_unlock_cycle() {
        let (store, owner) = store_with_account(1, "lock@example.com").await;
        let lock = AccountLock {
            locked_at: ts("2024-03-05T00:00:00Z"),
            unlock_code: vec![0xaa; 16],
        };
        store.lock_account(&owner, &lock).await.unwrap();
        assert!(store.account(&owner).await.unwrap().is_locked());
        assert_eq!(store.unlock_code(&owner).await.unwrap(), vec![0xaa; 16]);

        // Re-locking overwrites the code.
        let relock = AccountLock {
            locked_at: ts("2024-03-06T00:00:00Z"),
            unlock_code: vec![0xbb; 16],
        };
        store.lock_account(&owner, &relock).await.unwrap();
        assert_eq!(store.unlock_code(&owner).await.unwrap(), vec![0xbb; 16]);

        store.unlock_account(&owner).await.unwrap();
        assert!(!store.account(&owner).await.unwrap().is_locked());
        assert!(store.unlock_code(&owner).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_lock_missing_account() {
        let store = InMemoryAuthStore::new();
        let lock = AccountLock {
            locked_at: ts("2024-03-05T00:00:00Z"),
            unlock_code: vec![0xaa; 16],
        };
        assert!(store.lock_account(&uid(9), &lock).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unlock_missing_account_is_success() {
        let store = InMemoryAuthStore::new();
        store.unlock_account(&uid(9)).await.unwrap();
    }

    // ==================== Session tokens ====================

    #[tokio::test]
    async fn test_session_token_round_trip_with_joined_fields() {
        let (store, owner) = store_with_account(1, "s@example.com").await;
        let id = token_id(1);
        store.create_session_token(&id, &new_session(owner)).await.unwrap();

        let record = store.session_token(&id).await.unwrap();
        assert_eq!(record.uid, owner);
        assert_eq!(record.ua.browser.as_deref(), Some("Firefox"));
        assert_eq!(record.ua.os.as_deref(), Some("Linux"));
        // last_access_time starts out equal to created_at.
        assert_eq!(record.last_access_time, record.created_at);
        assert!(record.device_id.is_none());
        // Joined account fields reflect the owner's current state.
        assert_eq!(record.email, "s@example.com");
        assert!(!record.email_verified);
        assert_eq!(record.email_code, vec![0x44; 16]);
        assert_eq!(record.account_created_at, ts("2024-01-01T00:00:00Z"));

        store.verify_email(&owner).await.unwrap();
        assert!(store.session_token(&id).await.unwrap().email_verified);
    }

    #[tokio::test]
    async fn test_create_session_token_duplicate() {
        let (store, owner) = store_with_account(1, "s@example.com").await;
        let id = token_id(1);
        store.create_session_token(&id, &new_session(owner)).await.unwrap();
        let err = store.create_session_token(&id, &new_session(owner)).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_update_session_token() {
        let (store, owner) = store_with_account(1, "s@example.com").await;
        let id = token_id(1);
        store.create_session_token(&id, &new_session(owner)).await.unwrap();

        let update = SessionUpdate {
            ua: UserAgentInfo {
                browser: Some("Chrome".to_string()),
                ..UserAgentInfo::default()
            },
            last_access_time: ts("2024-03-04T12:00:00Z"),
        };
        store.update_session_token(&id, &update).await.unwrap();

        let record = store.session_token(&id).await.unwrap();
        assert_eq!(record.ua.browser.as_deref(), Some("Chrome"));
        assert!(record.ua.os.is_none());
        assert_eq!(record.last_access_time, ts("2024-03-04T12:00:00Z"));

        assert!(store
            .update_session_token(&token_id(9), &update)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_session_token_is_idempotent() {
        let (store, owner) = store_with_account(1, "s@example.com").await;
        let id = token_id(1);
        store.create_session_token(&id, &new_session(owner)).await.unwrap();

        store.delete_session_token(&id).await.unwrap();
        assert!(store.session_token(&id).await.unwrap_err().is_not_found());
        // Absence is not an error.
        store.delete_session_token(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_listing() {
        let (store, owner) = store_with_account(1, "s@example.com").await;
        let mut bare = new_session(owner);
        bare.ua = UserAgentInfo::default();
        store.create_session_token(&token_id(1), &new_session(owner)).await.unwrap();
        store.create_session_token(&token_id(2), &bare).await.unwrap();
        // A session for another account must not appear.
        store
            .create_session_token(&token_id(3), &new_session(uid(2)))
            .await
            .unwrap();

        let mut sessions = store.sessions(&owner).await.unwrap();
        sessions.sort_by_key(|entry| entry.token_id.to_hex());
        assert_eq!(sessions.len(), 2);
        // The token id is synthesized from the index key.
        assert_eq!(sessions[0].token_id, token_id(1));
        assert_eq!(sessions[1].token_id, token_id(2));
        // Unreported UA fields stay as the null marker.
        assert!(sessions[1].ua.browser.is_none());
        assert!(sessions[1].ua.device_type.is_none());
    }

    // ==================== Devices ====================

    #[tokio::test]
    async fn test_create_device_defaults_and_sentinel_key() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let device = store
            .create_device(&owner, &device_id(1), &DeviceUpdate::new())
            .await
            .unwrap();

        assert_eq!(device.uid, owner);
        assert!(device.name.is_none());
        assert!(device.session_token_id.is_none());
        assert_eq!(device.callback_public_key, vec![0u8; CALLBACK_PUBLIC_KEY_LEN]);

        // An explicitly empty key is also normalized to the sentinel.
        let update = DeviceUpdate {
            callback_public_key: Some(Vec::new()),
            ..DeviceUpdate::new()
        };
        let device = store.update_device(&owner, &device_id(1), &update).await.unwrap();
        assert_eq!(device.callback_public_key, vec![0u8; CALLBACK_PUBLIC_KEY_LEN]);
    }

    #[tokio::test]
    async fn test_create_device_errors() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        store
            .create_device(&owner, &device_id(1), &DeviceUpdate::new())
            .await
            .unwrap();

        let dup = store
            .create_device(&owner, &device_id(1), &DeviceUpdate::new())
            .await
            .unwrap_err();
        assert!(dup.is_duplicate());

        let missing = store
            .create_device(&uid(9), &device_id(2), &DeviceUpdate::new())
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_update_device_merges_fields() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let info = DeviceUpdate {
            name: Some("Laptop".to_string()),
            callback_url: Some("https://push.example.com/cb".to_string()),
            ..DeviceUpdate::new()
        };
        store.create_device(&owner, &device_id(1), &info).await.unwrap();

        // Omitted fields keep their current values.
        let rename = DeviceUpdate {
            name: Some("Work laptop".to_string()),
            ..DeviceUpdate::new()
        };
        let device = store.update_device(&owner, &device_id(1), &rename).await.unwrap();
        assert_eq!(device.name.as_deref(), Some("Work laptop"));
        assert_eq!(device.callback_url.as_deref(), Some("https://push.example.com/cb"));

        assert!(store
            .update_device(&owner, &device_id(9), &rename)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_device_session_binding_mirrors_and_backrefs() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let session_id = token_id(1);
        store.create_session_token(&session_id, &new_session(owner)).await.unwrap();

        let info = DeviceUpdate {
            session_token_id: Some(session_id),
            name: Some("Laptop".to_string()),
            ..DeviceUpdate::new()
        };
        let device = store.create_device(&owner, &device_id(1), &info).await.unwrap();

        // UA fields and last-access are mirrored from the session token.
        assert_eq!(device.ua.browser.as_deref(), Some("Firefox"));
        assert_eq!(device.last_access_time, Some(ts("2024-03-01T08:00:00Z")));
        assert_eq!(device.session_token_id, Some(session_id));

        // And the session token points back at the device.
        let record = store.session_token(&session_id).await.unwrap();
        assert_eq!(record.device_id, Some(device_id(1)));
    }

    #[tokio::test]
    async fn test_session_cannot_serve_two_devices() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let session_id = token_id(1);
        store.create_session_token(&session_id, &new_session(owner)).await.unwrap();

        let bind = DeviceUpdate {
            session_token_id: Some(session_id),
            ..DeviceUpdate::new()
        };
        store.create_device(&owner, &device_id(1), &bind).await.unwrap();

        let err = store.create_device(&owner, &device_id(2), &bind).await.unwrap_err();
        assert!(err.is_duplicate());

        // The original binding is untouched.
        let record = store.session_token(&session_id).await.unwrap();
        assert_eq!(record.device_id, Some(device_id(1)));
        // And the second device was not created.
        let devices = store.account_devices(&owner).await.unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn test_rebinding_device_unlinks_old_session() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let first = token_id(1);
        let second = token_id(2);
        store.create_session_token(&first, &new_session(owner)).await.unwrap();
        store.create_session_token(&second, &new_session(owner)).await.unwrap();

        let bind_first = DeviceUpdate {
            session_token_id: Some(first),
            ..DeviceUpdate::new()
        };
        store.create_device(&owner, &device_id(1), &bind_first).await.unwrap();

        let bind_second = DeviceUpdate {
            session_token_id: Some(second),
            ..DeviceUpdate::new()
        };
        let device = store.update_device(&owner, &device_id(1), &bind_second).await.unwrap();
        assert_eq!(device.session_token_id, Some(second));

        // The first token's back-reference is cleared, the second's is set.
        assert!(store.session_token(&first).await.unwrap().device_id.is_none());
        assert_eq!(
            store.session_token(&second).await.unwrap().device_id,
            Some(device_id(1))
        );
    }

    #[tokio::test]
    async fn test_update_without_session_id_retains_binding() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let session_id = token_id(1);
        store.create_session_token(&session_id, &new_session(owner)).await.unwrap();

        let bind = DeviceUpdate {
            session_token_id: Some(session_id),
            ..DeviceUpdate::new()
        };
        store.create_device(&owner, &device_id(1), &bind).await.unwrap();

        let rename = DeviceUpdate {
            name: Some("Renamed".to_string()),
            ..DeviceUpdate::new()
        };
        let device = store.update_device(&owner, &device_id(1), &rename).await.unwrap();
        assert_eq!(device.session_token_id, Some(session_id));
        assert_eq!(
            store.session_token(&session_id).await.unwrap().device_id,
            Some(device_id(1))
        );
    }

    #[tokio::test]
    async fn test_delete_device_cascades_session_token() {
        let (store, owner) = store_with_account(1, "d@example.com").await;
        let session_id = token_id(1);
        store.create_session_token(&session_id, &new_session(owner)).await.unwrap();

        let bind = DeviceUpdate {
            session_token_id: Some(session_id),
            ..DeviceUpdate::new()
        };
        store.create_device(&owner, &device_id(1), &bind).await.unwrap();

        store.delete_device(&owner, &device_id(1)).await.unwrap();
        assert!(store.account_devices(&owner).await.unwrap().is_empty());
        assert!(store.session_token(&session_id).await.unwrap_err().is_not_found());

        assert!(store
            .delete_device(&owner, &device_id(1))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_account_devices_missing_account_is_empty() {
        let store = InMemoryAuthStore::new();
        assert!(store.account_devices(&uid(9)).await.unwrap().is_empty());
    }

    // ==================== Key-fetch tokens ====================

    #[tokio::test]
    async fn test_key_fetch_token_lifecycle() {
        let (store, owner) = store_with_account(1, "k@example.com").await;
        let id = token_id(1);
        let token = NewKeyFetchToken {
            auth_key: vec![0x01; 32],
            uid: owner,
            key_bundle: vec![0x02; 96],
            created_at: ts("2024-03-01T08:00:00Z"),
        };
        store.create_key_fetch_token(&id, &token).await.unwrap();

        let dup = store.create_key_fetch_token(&id, &token).await.unwrap_err();
        assert!(dup.is_duplicate());

        let record = store.key_fetch_token(&id).await.unwrap();
        assert_eq!(record.auth_key, vec![0x01; 32]);
        assert_eq!(record.key_bundle, vec![0x02; 96]);
        assert!(!record.email_verified);
        assert_eq!(record.verifier_set_at, ts("2024-02-01T00:00:00Z"));

        store.delete_key_fetch_token(&id).await.unwrap();
        assert!(store.key_fetch_token(&id).await.unwrap_err().is_not_found());
        store.delete_key_fetch_token(&id).await.unwrap();
    }

    // ==================== Workflow tokens ====================

    #[tokio::test]
    async fn test_forgot_token_read_and_tries_update() {
        let (store, owner) = store_with_account(1, "f@example.com").await;
        let id = token_id(1);
        store.create_password_forgot_token(&id, &new_forgot(owner)).await.unwrap();

        let record = store.password_forgot_token(&id).await.unwrap();
        assert_eq!(record.pass_code, vec![0x77; 16]);
        assert_eq!(record.tries, 3);
        assert_eq!(record.email, "f@example.com");
        assert_eq!(record.verifier_set_at, ts("2024-02-01T00:00:00Z"));

        store.update_password_forgot_token(&id, 1).await.unwrap();
        assert_eq!(store.password_forgot_token(&id).await.unwrap().tries, 1);

        assert!(store
            .update_password_forgot_token(&token_id(9), 0)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_forgot_token_replacement_per_account() {
        let (store, owner) = store_with_account(1, "f@example.com").await;
        let first = token_id(1);
        let second = token_id(2);
        store.create_password_forgot_token(&first, &new_forgot(owner)).await.unwrap();
        store.create_password_forgot_token(&second, &new_forgot(owner)).await.unwrap();

        // The first token was replaced.
        assert!(store.password_forgot_token(&first).await.unwrap_err().is_not_found());
        assert!(store.password_forgot_token(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_forgot_token_duplicate_id() {
        let (store, owner) = store_with_account(1, "f@example.com").await;
        let id = token_id(1);
        store.create_password_forgot_token(&id, &new_forgot(owner)).await.unwrap();
        let err = store
            .create_password_forgot_token(&id, &new_forgot(owner))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_change_and_reset_token_replacement() {
        let (store, owner) = store_with_account(1, "c@example.com").await;
        let change = NewPasswordChangeToken {
            token_data: vec![0x10; 32],
            uid: owner,
            created_at: ts("2024-03-01T00:00:00Z"),
        };
        store.create_password_change_token(&token_id(1), &change).await.unwrap();
        store.create_password_change_token(&token_id(2), &change).await.unwrap();
        assert!(store
            .password_change_token(&token_id(1))
            .await
            .unwrap_err()
            .is_not_found());
        let record = store.password_change_token(&token_id(2)).await.unwrap();
        assert_eq!(record.email, "c@example.com");

        store.create_account_reset_token(&token_id(3), &new_reset(owner)).await.unwrap();
        store.create_account_reset_token(&token_id(4), &new_reset(owner)).await.unwrap();
        assert!(store
            .account_reset_token(&token_id(3))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.account_reset_token(&token_id(4)).await.is_ok());

        // Deletes are idempotent.
        store.delete_password_change_token(&token_id(2)).await.unwrap();
        store.delete_password_change_token(&token_id(2)).await.unwrap();
        store.delete_account_reset_token(&token_id(4)).await.unwrap();
        store.delete_account_reset_token(&token_id(4)).await.unwrap();
    }

    #[tokio::test]
    async fn test_forgot_password_verified() {
        let (store, owner) = store_with_account(1, "w@example.com").await;
        store
            .lock_account(
                &owner,
                &AccountLock {
                    locked_at: ts("2024-03-05T00:00:00Z"),
                    unlock_code: vec![0xaa; 16],
                },
            )
            .await
            .unwrap();

        let forgot_id = token_id(1);
        store.create_password_forgot_token(&forgot_id, &new_forgot(owner)).await.unwrap();
        // A stale reset token that must be replaced by the workflow.
        store.create_account_reset_token(&token_id(2), &new_reset(owner)).await.unwrap();

        let reset_id = token_id(3);
        store
            .forgot_password_verified(&forgot_id, &reset_id, &new_reset(owner))
            .await
            .unwrap();

        // Forgot token consumed, reset token replaced.
        assert!(store
            .password_forgot_token(&forgot_id)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .account_reset_token(&token_id(2))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.account_reset_token(&reset_id).await.is_ok());

        // Email verified and lock state cleared.
        let account = store.account(&owner).await.unwrap();
        assert!(account.email_verified);
        assert!(!account.is_locked());
        assert!(store.unlock_code(&owner).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_forgot_password_verified_missing_token_leaves_no_state() {
        let (store, owner) = store_with_account(1, "w@example.com").await;
        let reset_id = token_id(3);

        let err = store
            .forgot_password_verified(&token_id(1), &reset_id, &new_reset(owner))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        // The reset token must not have been created.
        assert!(store.account_reset_token(&reset_id).await.unwrap_err().is_not_found());
        assert!(!store.account(&owner).await.unwrap().email_verified);
    }

    // ==================== Reset / delete cascades ====================

    #[tokio::test]
    async fn test_reset_account_replaces_credentials_and_cascades() {
        let (store, owner) = store_with_account(1, "r@example.com").await;
        let bystander = uid(2);
        store.create_account(&bystander, &new_account("other@example.com")).await.unwrap();

        let session_id = token_id(1);
        store.create_session_token(&session_id, &new_session(owner)).await.unwrap();
        store
            .create_device(
                &owner,
                &device_id(1),
                &DeviceUpdate {
                    session_token_id: Some(session_id),
                    ..DeviceUpdate::new()
                },
            )
            .await
            .unwrap();
        store.create_password_forgot_token(&token_id(2), &new_forgot(owner)).await.unwrap();
        store.create_session_token(&token_id(3), &new_session(bystander)).await.unwrap();

        let reset = AccountReset {
            verify_hash: vec![0x99; 32],
            auth_salt: vec![0x98; 32],
            wrap_wrap_kb: vec![0x97; 32],
            verifier_set_at: ts("2024-04-01T00:00:00Z"),
            verifier_version: 2,
        };
        store.reset_account(&owner, &reset).await.unwrap();

        // Row and identity preserved, credentials replaced.
        let account = store.account(&owner).await.unwrap();
        assert_eq!(account.email, "r@example.com");
        assert_eq!(account.verifier_version, 2);
        store.check_password(&owner, &[0x99; 32]).await.unwrap();
        assert!(store
            .check_password(&owner, &[0x11; 32])
            .await
            .unwrap_err()
            .is_incorrect_password());

        // Devices and tokens cascaded for this account only.
        assert!(store.account_devices(&owner).await.unwrap().is_empty());
        assert!(store.sessions(&owner).await.unwrap().is_empty());
        assert!(store
            .password_forgot_token(&token_id(2))
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(store.sessions(&bystander).await.unwrap().len(), 1);

        assert!(store
            .reset_account(&uid(9), &reset)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_account_removes_everything() {
        let (store, owner) = store_with_account(1, "del@example.com").await;
        store.create_account(&uid(2), &new_account("keep@example.com")).await.unwrap();

        store.create_session_token(&token_id(1), &new_session(owner)).await.unwrap();
        let key_fetch = NewKeyFetchToken {
            auth_key: vec![0x01; 32],
            uid: owner,
            key_bundle: vec![0x02; 96],
            created_at: ts("2024-03-01T08:00:00Z"),
        };
        store.create_key_fetch_token(&token_id(2), &key_fetch).await.unwrap();
        store.create_password_forgot_token(&token_id(3), &new_forgot(owner)).await.unwrap();
        store
            .lock_account(
                &owner,
                &AccountLock {
                    locked_at: ts("2024-03-05T00:00:00Z"),
                    unlock_code: vec![0xaa; 16],
                },
            )
            .await
            .unwrap();

        store.delete_account(&owner).await.unwrap();

        assert!(store.account(&owner).await.unwrap_err().is_not_found());
        assert!(store.email_record("del@example.com").await.unwrap_err().is_not_found());
        assert!(!store.account_exists("del@example.com").await.unwrap());
        assert!(store.session_token(&token_id(1)).await.unwrap_err().is_not_found());
        assert!(store.key_fetch_token(&token_id(2)).await.unwrap_err().is_not_found());
        assert!(store
            .password_forgot_token(&token_id(3))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.unlock_code(&owner).await.unwrap_err().is_not_found());

        // Tables for other accounts are untouched.
        assert!(store.account(&uid(2)).await.is_ok());
        assert!(store.account_exists("keep@example.com").await.unwrap());

        assert!(store.delete_account(&owner).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_account_removes_open_id_index() {
        let store = InMemoryAuthStore::new();
        let mut account = new_account("oid@example.com");
        account.open_id = Some("idp|xyz".to_string());
        store.create_account(&uid(1), &account).await.unwrap();

        store.delete_account(&uid(1)).await.unwrap();
        assert!(store.open_id_record("idp|xyz").await.unwrap_err().is_not_found());

        // The openId is free for reuse afterwards.
        store.create_account(&uid(2), &account).await.unwrap();
        assert_eq!(store.open_id_record("idp|xyz").await.unwrap().uid, uid(2));
    }

    // ==================== Integrity ====================

    #[tokio::test]
    async fn test_cascade_aborts_on_inconsistent_back_reference() {
        let (store, owner) = store_with_account(1, "i@example.com").await;
        let session_id = token_id(1);
        store.create_session_token(&session_id, &new_session(owner)).await.unwrap();

        // Corrupt the relation: the session claims a device that does not
        // reference it back.
        {
            let mut tables = store.tables.write().await;
            let session = tables.session_tokens.get_mut(&session_id).unwrap();
            session.device_id = Some(device_id(9));
        }

        let reset = AccountReset {
            verify_hash: vec![0x99; 32],
            auth_salt: vec![0x98; 32],
            wrap_wrap_kb: vec![0x97; 32],
            verifier_set_at: ts("2024-04-01T00:00:00Z"),
            verifier_version: 2,
        };
        let err = store.reset_account(&owner, &reset).await.unwrap_err();
        assert!(err.is_fatal());

        let err = store.delete_account(&owner).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
