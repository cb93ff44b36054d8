//! Loan service layer - Business logic for the loan request lifecycle

use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    amount_in_range, rate_in_range, Advisory, CreateLoanRequest, CreateLoanTypeRequest, ListLoansQuery, LoanAction, LoanRequest,
    LoanTerms, LoanType, RejectionPrompt, RepaymentLine, RepaymentState,
    LOAN_REFERENCE_SEQUENCE,
};
use super::schedule::{self, Cadence, ScheduleError, ScheduleTerms, MAX_TENURE};
use super::state::LoanState;
use super::store::LoanStore;
use crate::ledger::{disbursal_lines, JournalEntryDraft, Ledger, LedgerError};
use crate::notify::{loan_confirmation, Notifier};
use crate::store::StoreError;

const MSG_COMPUTE_FIRST: &str = "Compute the repayments before requesting";
const MSG_PENDING_REPAYMENTS: &str = "Pending Repayments";
const MSG_ONGOING_LOAN: &str = "The partner has already an ongoing loan.";

/// Loan service errors
#[derive(Error, Debug)]
pub enum LoanError {
    #[error("{0}")]
    PolicyViolation(String),

    #[error("Cannot move loan from {from} to {to}")]
    InvalidTransition { from: LoanState, to: LoanState },

    #[error("Loan is {0} and can no longer be edited")]
    NotEditable(LoanState),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Loan request {0} not found")]
    LoanNotFound(Uuid),

    #[error("Loan type {0} not found")]
    LoanTypeNotFound(Uuid),

    #[error("Partner {0} not found")]
    PartnerNotFound(Uuid),

    #[error("Repayment line {0} not found")]
    RepaymentLineNotFound(Uuid),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ScheduleError> for LoanError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::UnsupportedCadence(_) => LoanError::Configuration(e.to_string()),
            ScheduleError::InvalidTenure(_)
            | ScheduleError::AmountOutOfRange
            | ScheduleError::DateOutOfRange(_) => {
                LoanError::Validation(e.to_string())
            }
        }
    }
}

/// Settings the loan lifecycle reads from configuration
#[derive(Debug, Clone)]
pub struct LoanSettings {
    /// Sender address of borrower mails
    pub mail_sender: String,
    /// Ledger account carried by every installment for the interest part
    pub interest_account_id: String,
    /// Ledger account carried by every installment for the principal part
    pub repayment_account_id: String,
}

/// Loan service for managing loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn LoanStore>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<dyn Ledger>,
    settings: LoanSettings,
}

impl LoanService {
    /// Create a new loan service instance
    pub fn new(
        store: Arc<dyn LoanStore>,
        notifier: Arc<dyn Notifier>,
        ledger: Arc<dyn Ledger>,
        settings: LoanSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            ledger,
            settings,
        }
    }

    /// Check the record store is reachable
    pub async fn store_health(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    // ===== Loan types =====

    /// Define a new loan type
    pub async fn create_loan_type(
        &self,
        request: CreateLoanTypeRequest,
    ) -> Result<LoanType, LoanError> {
        request
            .validate()
            .map_err(|e| LoanError::Validation(e.to_string()))?;
        Cadence::from_str(&request.tenure_plan)
            .map_err(|e| LoanError::Validation(e.to_string()))?;

        let now = Utc::now();
        let mut loan_type = LoanType {
            id: Uuid::new_v4(),
            name: request.name,
            loan_amount: request.loan_amount,
            tenure: request.tenure,
            tenure_plan: request.tenure_plan,
            interest_rate: request.interest_rate.unwrap_or(Decimal::ZERO),
            processing_fee: request.processing_fee,
            documents: request.documents,
            note: request.note,
            created_at: now,
            updated_at: now,
        };
        if let Some(percentage) = request.interest_rate_percentage {
            loan_type.set_interest_rate_percentage(percentage);
        }

        let loan_type = self.store.insert_loan_type(&loan_type).await?;
        tracing::info!(loan_type_id = %loan_type.id, name = %loan_type.name, "Loan type created");
        Ok(loan_type)
    }

    pub async fn get_loan_type(&self, id: Uuid) -> Result<LoanType, LoanError> {
        self.store
            .get_loan_type(id)
            .await?
            .ok_or(LoanError::LoanTypeNotFound(id))
    }

    pub async fn list_loan_types(&self) -> Result<Vec<LoanType>, LoanError> {
        Ok(self.store.list_loan_types().await?)
    }

    // ===== Loan requests =====

    /// Open a new loan request for a partner.
    ///
    /// Refused when the partner already has a request in a state other than
    /// draft, rejected or closed.
    pub async fn create_loan(&self, request: CreateLoanRequest) -> Result<LoanRequest, LoanError> {
        self.store
            .get_partner(request.partner_id)
            .await?
            .ok_or(LoanError::PartnerNotFound(request.partner_id))?;

        let loan_type = self.get_loan_type(request.loan_type_id).await?;

        let blocking: Vec<LoanState> = LoanState::ALL
            .into_iter()
            .filter(LoanState::blocks_new_request)
            .collect();
        let ongoing = self
            .store
            .find_partner_loans(request.partner_id, &blocking)
            .await?;
        if let Some(existing) = ongoing.first() {
            tracing::warn!(
                partner_id = %request.partner_id,
                existing = %existing.reference,
                state = %existing.state,
                "Loan request refused: partner has an ongoing loan"
            );
            return Err(LoanError::PolicyViolation(MSG_ONGOING_LOAN.to_string()));
        }

        let reference = self.store.next_sequence(LOAN_REFERENCE_SEQUENCE).await?;
        let now = Utc::now();

        let mut loan = LoanRequest {
            id: Uuid::new_v4(),
            reference,
            partner_id: request.partner_id,
            currency: request.currency.to_uppercase(),
            loan_type_id: loan_type.id,
            loan_amount: Decimal::ZERO,
            disbursal_amount: Decimal::ZERO,
            tenure: 1,
            interest_rate: Decimal::ZERO,
            issue_date: request.issue_date.unwrap_or_else(|| now.date_naive()),
            state: LoanState::Draft,
            reject_reason: None,
            schedule_computed: false,
            journal_id: None,
            debit_account_id: None,
            credit_account_id: None,
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        loan.apply_loan_type(&loan_type);
        loan.apply_terms(&request.terms);
        validate_terms(&loan)?;

        let loan = self.store.insert_loan(&loan).await?;
        tracing::info!(
            loan_id = %loan.id,
            reference = %loan.reference,
            partner_id = %loan.partner_id,
            "Loan request created"
        );
        Ok(loan)
    }

    pub async fn get_loan(&self, id: Uuid) -> Result<LoanRequest, LoanError> {
        self.store
            .get_loan(id)
            .await?
            .ok_or(LoanError::LoanNotFound(id))
    }

    pub async fn list_loans(&self, query: ListLoansQuery) -> Result<Vec<LoanRequest>, LoanError> {
        Ok(self.store.list_loans(&query).await?)
    }

    /// Edit the terms of a draft request
    pub async fn update_terms(&self, id: Uuid, terms: LoanTerms) -> Result<LoanRequest, LoanError> {
        let mut loan = self.get_loan(id).await?;
        if loan.state != LoanState::Draft {
            return Err(LoanError::NotEditable(loan.state));
        }

        loan.apply_terms(&terms);
        validate_terms(&loan)?;
        loan.updated_at = Utc::now();

        Ok(self.store.update_loan(&loan).await?)
    }

    /// Switch a draft request to another loan type, taking over its defaults
    pub async fn change_loan_type(
        &self,
        id: Uuid,
        loan_type_id: Uuid,
    ) -> Result<LoanRequest, LoanError> {
        let mut loan = self.get_loan(id).await?;
        if loan.state != LoanState::Draft {
            return Err(LoanError::NotEditable(loan.state));
        }

        let loan_type = self.get_loan_type(loan_type_id).await?;
        loan.apply_loan_type(&loan_type);
        validate_terms(&loan)?;
        loan.updated_at = Utc::now();

        Ok(self.store.update_loan(&loan).await?)
    }

    /// Regenerate the repayment schedule of a request.
    ///
    /// Existing lines are dropped unconditionally and replaced by the new set.
    pub async fn compute_repayment(&self, id: Uuid) -> Result<Vec<RepaymentLine>, LoanError> {
        let loan = self.get_loan(id).await?;
        if !loan.state.allows_schedule_changes() {
            return Err(LoanError::NotEditable(loan.state));
        }

        let loan_type = self.get_loan_type(loan.loan_type_id).await?;
        let cadence = Cadence::from_str(&loan_type.tenure_plan).map_err(|e| {
            tracing::error!(
                loan_type_id = %loan_type.id,
                tenure_plan = %loan_type.tenure_plan,
                "Loan type carries an unknown amortization plan"
            );
            LoanError::from(e)
        })?;

        let installments = schedule::generate(&ScheduleTerms {
            amount: loan.loan_amount,
            tenure: loan.tenure,
            interest_rate: loan.interest_rate,
            issue_date: loan.issue_date,
            cadence,
        })?;

        let lines: Vec<RepaymentLine> = installments
            .into_iter()
            .map(|installment| RepaymentLine {
                id: Uuid::new_v4(),
                loan_id: loan.id,
                name: format!("{}/{}", loan.reference, installment.period),
                partner_id: loan.partner_id,
                due_date: installment.due_date,
                amount: installment.principal,
                interest_amount: installment.interest,
                total_amount: installment.total,
                interest_account_id: self.settings.interest_account_id.clone(),
                repayment_account_id: self.settings.repayment_account_id.clone(),
                state: RepaymentState::Unpaid,
            })
            .collect();

        self.store.replace_schedule(loan.id, &lines).await?;
        tracing::info!(
            loan_id = %loan.id,
            reference = %loan.reference,
            installments = lines.len(),
            cadence = cadence.as_str(),
            "Repayment schedule computed"
        );
        Ok(lines)
    }

    pub async fn repayment_lines(&self, id: Uuid) -> Result<Vec<RepaymentLine>, LoanError> {
        let loan = self.get_loan(id).await?;
        Ok(self.store.list_repayment_lines(loan.id).await?)
    }

    /// Settle one installment
    pub async fn mark_line_paid(
        &self,
        loan_id: Uuid,
        line_id: Uuid,
    ) -> Result<RepaymentLine, LoanError> {
        let lines = self.repayment_lines(loan_id).await?;
        if !lines.iter().any(|line| line.id == line_id) {
            return Err(LoanError::RepaymentLineNotFound(line_id));
        }

        let line = self
            .store
            .set_repayment_state(line_id, RepaymentState::Paid)
            .await?
            .ok_or(LoanError::RepaymentLineNotFound(line_id))?;
        tracing::info!(loan_id = %loan_id, line = %line.name, "Installment marked as paid");
        Ok(line)
    }

    // ===== Lifecycle actions =====

    /// Confirm a draft request and notify the borrower
    pub async fn confirm(&self, id: Uuid) -> Result<LoanAction, LoanError> {
        let loan = self.get_loan(id).await?;
        let loan = self.transition(loan, LoanState::Confirmed).await?;

        match self.store.get_partner(loan.partner_id).await? {
            Some(partner) => match partner.email.as_deref().filter(|e| !e.is_empty()) {
                Some(email) => {
                    let mail = loan_confirmation(
                        &self.settings.mail_sender,
                        &partner.name,
                        email,
                        &loan.reference,
                    );
                    if let Err(e) = self.notifier.send(mail).await {
                        tracing::error!(
                            loan_id = %loan.id,
                            error = %e,
                            "Failed to send loan confirmation mail"
                        );
                    }
                }
                None => {
                    tracing::warn!(
                        loan_id = %loan.id,
                        partner_id = %partner.id,
                        "Partner has no email, confirmation mail skipped"
                    );
                }
            },
            None => {
                tracing::warn!(loan_id = %loan.id, "Partner vanished before confirmation mail");
            }
        }

        Ok(LoanAction::applied(loan))
    }

    /// Submit the request for approval; needs a computed schedule
    pub async fn request_approval(&self, id: Uuid) -> Result<LoanAction, LoanError> {
        let loan = self.get_loan(id).await?;
        ensure_transition(&loan, LoanState::Waiting)?;

        if !loan.schedule_computed {
            tracing::info!(loan_id = %loan.id, "Approval requested before schedule was computed");
            return Ok(LoanAction::Advisory(Advisory::repayment(MSG_COMPUTE_FIRST)));
        }

        let loan = self.transition(loan, LoanState::Waiting).await?;
        Ok(LoanAction::applied(loan))
    }

    pub async fn approve(&self, id: Uuid) -> Result<LoanAction, LoanError> {
        let loan = self.get_loan(id).await?;
        let loan = self.transition(loan, LoanState::Approved).await?;
        Ok(LoanAction::applied(loan))
    }

    /// Pay out the loan: book and post the disbursal entry, then mark the
    /// request as disbursed
    pub async fn disburse(&self, id: Uuid) -> Result<LoanAction, LoanError> {
        let loan = self.get_loan(id).await?;
        ensure_transition(&loan, LoanState::Disbursed)?;

        let (journal_id, debit_account, credit_account) = match (
            loan.journal_id.as_deref(),
            loan.debit_account_id.as_deref(),
            loan.credit_account_id.as_deref(),
        ) {
            (Some(j), Some(d), Some(c)) => (j, d, c),
            _ => {
                return Err(LoanError::Validation(
                    "journal, debit account and credit account are required to disburse"
                        .to_string(),
                ))
            }
        };

        let partner = self
            .store
            .get_partner(loan.partner_id)
            .await?
            .ok_or(LoanError::PartnerNotFound(loan.partner_id))?;

        let draft = JournalEntryDraft {
            name: format!("DIS / {}", loan.reference),
            reference: loan.reference.clone(),
            narration: loan.reference.clone(),
            journal_id: journal_id.to_string(),
            date: loan.issue_date,
            lines: disbursal_lines(
                &partner.name,
                loan.disbursal_amount,
                debit_account,
                credit_account,
            ),
        };
        draft.validate()?;

        let entry = self.ledger.create_entry(draft).await?;
        let entry = self.ledger.post_entry(entry.id).await?;
        tracing::info!(
            loan_id = %loan.id,
            entry_id = %entry.id,
            amount = %loan.disbursal_amount,
            "Disbursal entry posted"
        );

        let loan = self.transition(loan, LoanState::Disbursed).await?;
        Ok(LoanAction::applied(loan))
    }

    /// Close a disbursed loan once every installment is settled
    pub async fn close(&self, id: Uuid) -> Result<LoanAction, LoanError> {
        let loan = self.get_loan(id).await?;
        ensure_transition(&loan, LoanState::Closed)?;

        let lines = self.store.list_repayment_lines(loan.id).await?;
        let unpaid = lines
            .iter()
            .filter(|line| line.state == RepaymentState::Unpaid)
            .count();
        if unpaid > 0 {
            tracing::info!(loan_id = %loan.id, unpaid, "Close refused: pending repayments");
            return Ok(LoanAction::Advisory(Advisory::repayment(
                MSG_PENDING_REPAYMENTS,
            )));
        }

        let loan = self.transition(loan, LoanState::Closed).await?;
        Ok(LoanAction::applied(loan))
    }

    /// Start a rejection. The state is only written once a reason arrives
    /// through [`LoanService::reject_with_reason`].
    pub async fn begin_rejection(&self, id: Uuid) -> Result<RejectionPrompt, LoanError> {
        let loan = self.get_loan(id).await?;
        ensure_transition(&loan, LoanState::Rejected)?;

        Ok(RejectionPrompt {
            title: "Loan Rejection".to_string(),
            loan_id: loan.id,
            loan_reference: loan.reference,
        })
    }

    pub async fn reject_with_reason(&self, id: Uuid, reason: &str) -> Result<LoanAction, LoanError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LoanError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        let mut loan = self.get_loan(id).await?;
        ensure_transition(&loan, LoanState::Rejected)?;
        loan.reject_reason = Some(reason.to_string());

        let loan = self.transition(loan, LoanState::Rejected).await?;
        Ok(LoanAction::applied(loan))
    }

    // ===== Private Helper Methods =====

    async fn transition(
        &self,
        mut loan: LoanRequest,
        next: LoanState,
    ) -> Result<LoanRequest, LoanError> {
        ensure_transition(&loan, next)?;

        let previous = loan.state;
        loan.state = next;
        loan.updated_at = Utc::now();
        let loan = self.store.update_loan(&loan).await?;

        tracing::info!(
            loan_id = %loan.id,
            reference = %loan.reference,
            from = %previous,
            to = %next,
            "Loan state changed"
        );
        Ok(loan)
    }
}

fn ensure_transition(loan: &LoanRequest, next: LoanState) -> Result<(), LoanError> {
    if loan.state.can_transition_to(next) {
        Ok(())
    } else {
        Err(LoanError::InvalidTransition {
            from: loan.state,
            to: next,
        })
    }
}

/// Bounds a request must satisfy whatever combination of type defaults and
/// edits produced it
fn validate_terms(loan: &LoanRequest) -> Result<(), LoanError> {
    if !(1..=MAX_TENURE).contains(&loan.tenure) {
        return Err(LoanError::Validation(format!(
            "tenure must be between 1 and {} periods",
            MAX_TENURE
        )));
    }
    amount_in_range(&loan.loan_amount)
        .and_then(|_| rate_in_range(&loan.interest_rate))
        .map_err(|e| LoanError::Validation(e.to_string()))
}
