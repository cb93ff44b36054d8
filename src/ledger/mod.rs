//! Ledger entries for loan disbursal
//!
//! A disbursal is booked as one balanced journal entry with a debit and a
//! credit line, created in draft and then posted.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Unbalanced entry: debit {debit} != credit {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },

    #[error("Journal entry {0} not found")]
    EntryNotFound(Uuid),

    #[error("Journal entry {0} is already posted")]
    AlreadyPosted(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Journal entry state
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "entry_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Draft,
    Posted,
}

/// One side of a journal entry
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct JournalLine {
    pub name: String,
    pub account_id: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Entry to be created
#[derive(Debug, Clone)]
pub struct JournalEntryDraft {
    pub name: String,
    pub reference: String,
    pub narration: String,
    pub journal_id: String,
    pub date: NaiveDate,
    pub lines: Vec<JournalLine>,
}

impl JournalEntryDraft {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let debit: Decimal = self.lines.iter().map(|l| l.debit).sum();
        let credit: Decimal = self.lines.iter().map(|l| l.credit).sum();
        if debit != credit {
            return Err(LedgerError::Unbalanced { debit, credit });
        }
        Ok(())
    }
}

/// Persisted journal entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JournalEntry {
    pub id: Uuid,
    pub name: String,
    pub reference: String,
    pub narration: String,
    pub journal_id: String,
    pub date: NaiveDate,
    pub state: EntryState,
    pub lines: Vec<JournalLine>,
    pub created_at: DateTime<Utc>,
}

/// Ledger service seam
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn create_entry(&self, draft: JournalEntryDraft) -> Result<JournalEntry, LedgerError>;

    /// Finalize a draft entry
    async fn post_entry(&self, entry_id: Uuid) -> Result<JournalEntry, LedgerError>;
}

/// Build the debit/credit pair booking a disbursal.
///
/// A positive amount debits `debit_account` and credits `credit_account`;
/// a negative amount swaps the sides. Both lines carry the borrower name.
pub fn disbursal_lines(
    label: &str,
    amount: Decimal,
    debit_account: &str,
    credit_account: &str,
) -> Vec<JournalLine> {
    let positive = amount.max(Decimal::ZERO);
    let negative = (-amount).max(Decimal::ZERO);

    vec![
        JournalLine {
            name: label.to_string(),
            account_id: debit_account.to_string(),
            debit: positive,
            credit: negative,
        },
        JournalLine {
            name: label.to_string(),
            account_id: credit_account.to_string(),
            debit: negative,
            credit: positive,
        },
    ]
}
