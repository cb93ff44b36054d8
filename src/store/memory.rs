//! In-process record store
//!
//! Keeps every record in memory behind one async mutex. Used by the tests
//! and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::StoreError;
use crate::auth::UserStore;
use crate::ledger::{EntryState, JournalEntry, JournalEntryDraft, Ledger, LedgerError};
use crate::loan::{
    ListLoansQuery, LoanRequest, LoanState, LoanStore, LoanType, Partner, RepaymentLine,
    RepaymentState, LOAN_REFERENCE_SEQUENCE,
};
use crate::models::{NewUser, User};
use crate::notify::{Mail, Notifier, NotifyError};

/// Single-use signup invitation, optionally issued to an existing user
#[derive(Debug, Clone)]
pub struct SignupToken {
    pub token: String,
    pub user_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used: bool,
}

impl SignupToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            user_id: None,
            expires_at: None,
            used: false,
        }
    }

    /// Invitation completing the account of `user_id`
    pub fn for_user(token: &str, user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::new(token)
        }
    }

    fn is_redeemable(&self) -> bool {
        !self.used && self.expires_at.map_or(true, |at| at > Utc::now())
    }
}

struct Sequence {
    prefix: String,
    padding: usize,
    next_number: u64,
}

#[derive(Default)]
struct Inner {
    sequences: HashMap<String, Sequence>,
    loan_types: HashMap<Uuid, LoanType>,
    partners: HashMap<Uuid, Partner>,
    loans: HashMap<Uuid, LoanRequest>,
    repayment_lines: Vec<RepaymentLine>,
    users: Vec<User>,
    signup_tokens: HashMap<String, SignupToken>,
    journal_entries: Vec<JournalEntry>,
    outbox: Vec<Mail>,
}

/// In-memory implementation of every store seam
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.sequences.insert(
            LOAN_REFERENCE_SEQUENCE.to_string(),
            Sequence {
                prefix: "LOAN/".to_string(),
                padding: 5,
                next_number: 1,
            },
        );
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub async fn add_partner(&self, partner: Partner) {
        self.inner.lock().await.partners.insert(partner.id, partner);
    }

    pub async fn add_signup_token(&self, token: SignupToken) {
        self.inner
            .lock()
            .await
            .signup_tokens
            .insert(token.token.clone(), token);
    }

    /// Overwrite a stored loan type as-is, bypassing validation
    pub async fn put_loan_type(&self, loan_type: LoanType) {
        self.inner
            .lock()
            .await
            .loan_types
            .insert(loan_type.id, loan_type);
    }

    /// Flip the active flag of a stored user
    pub async fn set_user_active(&self, user_id: Uuid, active: bool) {
        if let Some(user) = self
            .inner
            .lock()
            .await
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
        {
            user.active = active;
        }
    }

    pub async fn sent_mails(&self) -> Vec<Mail> {
        self.inner.lock().await.outbox.clone()
    }

    pub async fn journal_entries(&self) -> Vec<JournalEntry> {
        self.inner.lock().await.journal_entries.clone()
    }

    pub async fn users(&self) -> Vec<User> {
        self.inner.lock().await.users.clone()
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn next_sequence(&self, code: &str) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().await;
        let sequence = inner
            .sequences
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(format!("sequence {}", code)))?;
        let number = sequence.next_number;
        sequence.next_number += 1;
        Ok(format!(
            "{}{:0width$}",
            sequence.prefix,
            number,
            width = sequence.padding
        ))
    }

    async fn insert_loan_type(&self, loan_type: &LoanType) -> Result<LoanType, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.loan_types.insert(loan_type.id, loan_type.clone());
        Ok(loan_type.clone())
    }

    async fn get_loan_type(&self, id: Uuid) -> Result<Option<LoanType>, StoreError> {
        Ok(self.inner.lock().await.loan_types.get(&id).cloned())
    }

    async fn list_loan_types(&self) -> Result<Vec<LoanType>, StoreError> {
        let inner = self.inner.lock().await;
        let mut types: Vec<LoanType> = inner.loan_types.values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn get_partner(&self, id: Uuid) -> Result<Option<Partner>, StoreError> {
        Ok(self.inner.lock().await.partners.get(&id).cloned())
    }

    async fn insert_loan(&self, loan: &LoanRequest) -> Result<LoanRequest, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.loans.values().any(|l| l.reference == loan.reference) {
            return Err(StoreError::Conflict(format!(
                "reference {} already used",
                loan.reference
            )));
        }
        inner.loans.insert(loan.id, loan.clone());
        Ok(loan.clone())
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<LoanRequest>, StoreError> {
        Ok(self.inner.lock().await.loans.get(&id).cloned())
    }

    async fn list_loans(&self, query: &ListLoansQuery) -> Result<Vec<LoanRequest>, StoreError> {
        let page = query.page.unwrap_or(1).max(1) as usize;
        let limit = query.limit.unwrap_or(20).clamp(1, 100) as usize;

        let inner = self.inner.lock().await;
        let mut loans: Vec<LoanRequest> = inner
            .loans
            .values()
            .filter(|l| query.partner_id.map_or(true, |p| l.partner_id == p))
            .filter(|l| query.state.map_or(true, |s| l.state == s))
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(loans
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect())
    }

    async fn find_partner_loans(
        &self,
        partner_id: Uuid,
        states: &[LoanState],
    ) -> Result<Vec<LoanRequest>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .loans
            .values()
            .filter(|l| l.partner_id == partner_id && states.contains(&l.state))
            .cloned()
            .collect())
    }

    async fn update_loan(&self, loan: &LoanRequest) -> Result<LoanRequest, StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| StoreError::NotFound(format!("loan {}", loan.id)))?;

        // Reference and creation time never change once assigned
        let reference = stored.reference.clone();
        let created_at = stored.created_at;
        let schedule_computed = stored.schedule_computed;
        *stored = loan.clone();
        stored.reference = reference;
        stored.created_at = created_at;
        stored.schedule_computed = schedule_computed;
        Ok(stored.clone())
    }

    async fn replace_schedule(
        &self,
        loan_id: Uuid,
        lines: &[RepaymentLine],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let loan = inner
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| StoreError::NotFound(format!("loan {}", loan_id)))?;
        loan.schedule_computed = true;

        inner.repayment_lines.retain(|line| line.loan_id != loan_id);
        inner.repayment_lines.extend_from_slice(lines);
        Ok(())
    }

    async fn list_repayment_lines(&self, loan_id: Uuid) -> Result<Vec<RepaymentLine>, StoreError> {
        let inner = self.inner.lock().await;
        let mut lines: Vec<RepaymentLine> = inner
            .repayment_lines
            .iter()
            .filter(|line| line.loan_id == loan_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(lines)
    }

    async fn set_repayment_state(
        &self,
        line_id: Uuid,
        state: RepaymentState,
    ) -> Result<Option<RepaymentLine>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .repayment_lines
            .iter_mut()
            .find(|line| line.id == line_id)
            .map(|line| {
                line.state = state;
                line.clone()
            }))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.login == login).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.users.iter().any(|u| u.login == user.login) {
            return Err(StoreError::Conflict(format!(
                "login {} already exists",
                user.login
            )));
        }
        let user = user.into_user();
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn link_oauth(
        &self,
        user_id: Uuid,
        provider_id: &str,
        oauth_uid: &str,
        access_token: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.oauth_provider_id = Some(provider_id.to_string());
        user.oauth_uid = Some(oauth_uid.to_string());
        user.oauth_access_token = Some(access_token.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_users_by_oauth(
        &self,
        provider_id: &str,
        oauth_uid: &str,
    ) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| {
                u.oauth_provider_id.as_deref() == Some(provider_id)
                    && u.oauth_uid.as_deref() == Some(oauth_uid)
            })
            .cloned()
            .collect())
    }

    async fn update_access_token(
        &self,
        user_id: Uuid,
        access_token: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.oauth_access_token = Some(access_token.to_string());
        Ok(())
    }

    async fn signup_with_token(&self, token: &str, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        let invited = match inner.signup_tokens.get(token) {
            Some(entry) if entry.is_redeemable() => entry.user_id,
            _ => return Err(StoreError::NotFound("signup token".to_string())),
        };

        let user = match invited {
            Some(user_id) => {
                let existing = inner
                    .users
                    .iter_mut()
                    .find(|u| u.id == user_id)
                    .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
                existing.oauth_provider_id = user.oauth_provider_id;
                existing.oauth_uid = user.oauth_uid;
                existing.oauth_access_token = user.oauth_access_token;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                if inner.users.iter().any(|u| u.login == user.login) {
                    return Err(StoreError::Conflict(format!(
                        "login {} already exists",
                        user.login
                    )));
                }
                let user = user.into_user();
                inner.users.push(user.clone());
                user
            }
        };

        if let Some(entry) = inner.signup_tokens.get_mut(token) {
            entry.used = true;
        }
        Ok(user)
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn create_entry(&self, draft: JournalEntryDraft) -> Result<JournalEntry, LedgerError> {
        draft.validate()?;
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            name: draft.name,
            reference: draft.reference,
            narration: draft.narration,
            journal_id: draft.journal_id,
            date: draft.date,
            state: EntryState::Draft,
            lines: draft.lines,
            created_at: Utc::now(),
        };
        self.inner.lock().await.journal_entries.push(entry.clone());
        Ok(entry)
    }

    async fn post_entry(&self, entry_id: Uuid) -> Result<JournalEntry, LedgerError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .journal_entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if entry.state == EntryState::Posted {
            return Err(LedgerError::AlreadyPosted(entry_id));
        }
        entry.state = EntryState::Posted;
        Ok(entry.clone())
    }
}

#[async_trait]
impl Notifier for MemoryStore {
    async fn send(&self, mail: Mail) -> Result<(), NotifyError> {
        if mail.email_to.is_empty() {
            return Err(NotifyError::MissingRecipient);
        }
        self.inner.lock().await.outbox.push(mail);
        Ok(())
    }
}
