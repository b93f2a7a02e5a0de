//! Record and payload types exchanged across the AuthDB storage contract.
//!
//! Inputs are `New*` payloads; outputs are read-shaped records. Account
//! reads always return the filtered [`Account`] view, which does not carry
//! the verify hash.

use authdb_core::{DeviceId, Timestamp, TokenId, Uid, UserAgentInfo, serde_hex};
use serde::{Deserialize, Serialize};

/// Length of the all-zero sentinel stored when a device supplies an empty
/// callback public key.
pub const CALLBACK_PUBLIC_KEY_LEN: usize = 32;

/// Case-folds an email address into its uniqueness key.
///
/// The normalized form is used for indexing and matching; the display form
/// is stored alongside it unchanged.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

/// Normalizes callback key material: empty input becomes the fixed-length
/// all-zero sentinel ("no key provided"), anything else is kept as supplied.
#[must_use]
pub fn normalize_callback_public_key(key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        vec![0u8; CALLBACK_PUBLIC_KEY_LEN]
    } else {
        key.to_vec()
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Payload for creating an account.
///
/// Carries the verify hash; it is the only place the secret crosses the
/// contract in the account-to-store direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    /// Display form of the email address. The store derives the normalized
    /// uniqueness key from it.
    pub email: String,

    /// External identity-provider id, unique when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,

    /// Password verifier hash (secret, never returned by reads).
    #[serde(with = "serde_hex")]
    pub verify_hash: Vec<u8>,

    #[serde(with = "serde_hex")]
    pub auth_salt: Vec<u8>,

    #[serde(with = "serde_hex")]
    pub wrap_wrap_kb: Vec<u8>,

    pub verifier_set_at: Timestamp,

    pub verifier_version: u32,

    pub email_verified: bool,

    #[serde(with = "serde_hex")]
    pub email_code: Vec<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    pub created_at: Timestamp,
}

/// Filtered account view returned by every account read.
///
/// Identical to the stored row minus the verify hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uid: Uid,
    pub normalized_email: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    #[serde(with = "serde_hex")]
    pub auth_salt: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub wrap_wrap_kb: Vec<u8>,
    pub verifier_set_at: Timestamp,
    pub verifier_version: u32,
    pub email_verified: bool,
    #[serde(with = "serde_hex")]
    pub email_code: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<Timestamp>,
}

impl Account {
    /// Returns `true` when the account is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }
}

/// Payload for locking an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLock {
    pub locked_at: Timestamp,
    /// Unlock code installed for the account, overwriting any prior code.
    #[serde(with = "serde_hex")]
    pub unlock_code: Vec<u8>,
}

/// Replacement credential fields applied by an account reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReset {
    #[serde(with = "serde_hex")]
    pub verify_hash: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub auth_salt: Vec<u8>,
    #[serde(with = "serde_hex")]
    pub wrap_wrap_kb: Vec<u8>,
    pub verifier_set_at: Timestamp,
    pub verifier_version: u32,
}

// =============================================================================
// Session tokens
// =============================================================================

/// Payload for creating a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionToken {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    pub created_at: Timestamp,
    /// User-agent descriptor captured at login.
    #[serde(default)]
    pub ua: UserAgentInfo,
}

/// Payload for updating a session token's user-agent and last-access fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default)]
    pub ua: UserAgentInfo,
    pub last_access_time: Timestamp,
}

/// A session token read by id, joined with the fields of its owning account
/// that callers need without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenRecord {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    pub created_at: Timestamp,
    pub last_access_time: Timestamp,
    #[serde(default)]
    pub ua: UserAgentInfo,
    /// Device currently bound to this token, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,

    // Joined account fields.
    pub email_verified: bool,
    pub email: String,
    #[serde(with = "serde_hex")]
    pub email_code: Vec<u8>,
    pub verifier_set_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub account_created_at: Timestamp,
}

/// One entry in an account's session listing.
///
/// The token id is synthesized from the index key; user-agent fields are
/// `None` when never reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub token_id: TokenId,
    pub uid: Uid,
    pub created_at: Timestamp,
    pub last_access_time: Timestamp,
    #[serde(default)]
    pub ua: UserAgentInfo,
}

// =============================================================================
// Devices
// =============================================================================

/// Partial device payload with merge semantics.
///
/// Every field is optional: an omitted field keeps the device's current
/// value, defaulting to unset only on first creation. An empty (but present)
/// callback public key is normalized to the all-zero sentinel. Omitting
/// `session_token_id` retains the existing binding unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token_id: Option<TokenId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, with = "serde_hex::option")]
    pub callback_public_key: Option<Vec<u8>>,
}

impl DeviceUpdate {
    /// Creates an empty payload (merge keeps everything as-is).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A device registration under an account.
///
/// User-agent and last-access fields are mirrored from the linked session
/// token for fast read access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub uid: Uid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token_id: Option<TokenId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(with = "serde_hex")]
    pub callback_public_key: Vec<u8>,
    #[serde(default)]
    pub ua: UserAgentInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access_time: Option<Timestamp>,
}

impl Device {
    /// Name shown to the user: the registered name, falling back to a
    /// description of the mirrored user agent.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.ua.display_name(),
        }
    }
}

// =============================================================================
// Key-fetch tokens
// =============================================================================

/// Payload for creating a key-fetch token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKeyFetchToken {
    #[serde(with = "serde_hex")]
    pub auth_key: Vec<u8>,
    pub uid: Uid,
    #[serde(with = "serde_hex")]
    pub key_bundle: Vec<u8>,
    pub created_at: Timestamp,
}

/// A key-fetch token read by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFetchTokenRecord {
    #[serde(with = "serde_hex")]
    pub auth_key: Vec<u8>,
    pub uid: Uid,
    #[serde(with = "serde_hex")]
    pub key_bundle: Vec<u8>,
    pub created_at: Timestamp,
    // Joined account fields.
    pub email_verified: bool,
    pub verifier_set_at: Timestamp,
}

// =============================================================================
// Workflow tokens
// =============================================================================

/// Payload for creating a password-forgot token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPasswordForgotToken {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    #[serde(with = "serde_hex")]
    pub pass_code: Vec<u8>,
    pub tries: u32,
    pub created_at: Timestamp,
}

/// A password-forgot token read by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordForgotTokenRecord {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    #[serde(with = "serde_hex")]
    pub pass_code: Vec<u8>,
    pub tries: u32,
    pub created_at: Timestamp,
    // Joined account fields.
    pub email: String,
    pub verifier_set_at: Timestamp,
}

/// Payload for creating a password-change token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPasswordChangeToken {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    pub created_at: Timestamp,
}

/// A password-change token read by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeTokenRecord {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    pub created_at: Timestamp,
    // Joined account fields.
    pub email: String,
    pub verifier_set_at: Timestamp,
}

/// Payload for creating an account-reset token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountResetToken {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    pub created_at: Timestamp,
}

/// An account-reset token read by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResetTokenRecord {
    #[serde(with = "serde_hex")]
    pub token_data: Vec<u8>,
    pub uid: Uid,
    pub created_at: Timestamp,
    // Joined account fields.
    pub email: String,
    pub verifier_set_at: Timestamp,
}
