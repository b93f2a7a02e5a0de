//! Undo-journal transaction over the in-memory tables.
//!
//! Multi-step operations record the prior state of every row they touch;
//! `commit` discards the journal, `rollback` restores it in reverse order.
//! Both consume the transaction, so a journal can never be replayed twice.
//! The journal only captures rows the operation actually touches, not whole
//! tables.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::{debug, warn};
use uuid::Uuid;

use authdb_core::{Timestamp, TokenId, Uid};

use crate::store::{AccountResetTokenRow, PasswordForgotTokenRow, Tables};

/// One captured prior state. `prior: None` means the row did not exist and
/// rollback removes whatever now sits at the key.
#[derive(Debug)]
pub(crate) enum Undo {
    PasswordForgotToken {
        id: TokenId,
        prior: Option<PasswordForgotTokenRow>,
    },
    AccountResetToken {
        id: TokenId,
        prior: Option<AccountResetTokenRow>,
    },
    AccountState {
        uid: Uid,
        email_verified: bool,
        locked_at: Option<Timestamp>,
    },
    UnlockCode {
        uid: Uid,
        prior: Option<Vec<u8>>,
    },
}

/// A transaction over the in-memory tables.
#[derive(Debug)]
pub(crate) struct StoreTransaction {
    id: Uuid,
    journal: Vec<Undo>,
}

impl StoreTransaction {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            journal: Vec::new(),
        }
    }

    /// Records the prior state of a row about to be mutated.
    pub(crate) fn record(&mut self, undo: Undo) {
        self.journal.push(undo);
    }

    /// Number of recorded undo entries.
    pub(crate) fn len(&self) -> usize {
        self.journal.len()
    }

    /// Commits the transaction: the mutations stand, the journal is dropped.
    pub(crate) fn commit(self) {
        debug!(tx = %self.id, entries = self.len(), "transaction committed");
    }

    /// Rolls the tables back to the state captured in the journal, applying
    /// entries in reverse order.
    pub(crate) fn rollback(self, tables: &mut Tables) {
        warn!(tx = %self.id, entries = self.len(), "rolling back transaction");
        for undo in self.journal.into_iter().rev() {
            match undo {
                Undo::PasswordForgotToken { id, prior } => {
                    restore(&mut tables.password_forgot_tokens, id, prior);
                }
                Undo::AccountResetToken { id, prior } => {
                    restore(&mut tables.account_reset_tokens, id, prior);
                }
                Undo::AccountState {
                    uid,
                    email_verified,
                    locked_at,
                } => {
                    if let Some(account) = tables.accounts.get_mut(&uid) {
                        account.email_verified = email_verified;
                        account.locked_at = locked_at;
                    }
                }
                Undo::UnlockCode { uid, prior } => {
                    restore(&mut tables.unlock_codes, uid, prior);
                }
            }
        }
    }
}

fn restore<K, V>(table: &mut HashMap<K, V>, key: K, prior: Option<V>)
where
    K: Eq + Hash,
{
    match prior {
        Some(row) => {
            table.insert(key, row);
        }
        None => {
            table.remove(&key);
        }
    }
}
