//! Loan models for LoanDesk

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::state::LoanState;

/// Sequence code used to allocate loan references
pub const LOAN_REFERENCE_SEQUENCE: &str = "increment_loan_ref";

/// Largest loan amount or processing fee accepted, in currency units
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Largest fractional interest rate accepted (1000 %)
pub const MAX_INTEREST_RATE: i64 = 10;

fn out_of_range(message: &'static str) -> ValidationError {
    let mut err = ValidationError::new("range");
    err.message = Some(Cow::Borrowed(message));
    err
}

pub(crate) fn amount_in_range(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::from(MAX_AMOUNT) {
        return Err(out_of_range("amount must be between 0 and 1000000000000"));
    }
    Ok(())
}

pub(crate) fn rate_in_range(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::from(MAX_INTEREST_RATE) {
        return Err(out_of_range("interest rate must be between 0 and 10"));
    }
    Ok(())
}

fn percentage_in_range(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::from(MAX_INTEREST_RATE * 100) {
        return Err(out_of_range("interest percentage must be between 0 and 1000"));
    }
    Ok(())
}

/// Loan type template
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanType {
    pub id: Uuid,
    pub name: String,
    pub loan_amount: Decimal,
    pub tenure: i32,
    /// Stored cadence name, parsed when a schedule is generated
    pub tenure_plan: String,
    pub interest_rate: Decimal,
    pub processing_fee: Decimal,
    pub documents: Vec<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanType {
    /// Amount left to pay out once the processing fee is withheld
    pub fn disbursal_amount(&self) -> Decimal {
        self.loan_amount.saturating_sub(self.processing_fee)
    }

    pub fn interest_rate_percentage(&self) -> Decimal {
        self.interest_rate.saturating_mul(Decimal::ONE_HUNDRED)
    }

    pub fn set_interest_rate_percentage(&mut self, percentage: Decimal) {
        self.interest_rate = percentage / Decimal::ONE_HUNDRED;
    }
}

/// Loan request model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanRequest {
    pub id: Uuid,
    pub reference: String,
    pub partner_id: Uuid,
    pub currency: String,
    pub loan_type_id: Uuid,
    pub loan_amount: Decimal,
    pub disbursal_amount: Decimal,
    pub tenure: i32,
    pub interest_rate: Decimal,
    pub issue_date: NaiveDate,
    pub state: LoanState,
    pub reject_reason: Option<String>,
    /// Set once a repayment schedule has been generated
    pub schedule_computed: bool,
    pub journal_id: Option<String>,
    pub debit_account_id: Option<String>,
    pub credit_account_id: Option<String>,
    pub documents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRequest {
    pub fn interest_rate_percentage(&self) -> Decimal {
        self.interest_rate.saturating_mul(Decimal::ONE_HUNDRED)
    }

    pub fn set_interest_rate_percentage(&mut self, percentage: Decimal) {
        self.interest_rate = percentage / Decimal::ONE_HUNDRED;
    }

    /// Copy the defaults of a loan type onto this request
    pub fn apply_loan_type(&mut self, loan_type: &LoanType) {
        self.loan_type_id = loan_type.id;
        self.loan_amount = loan_type.loan_amount;
        self.disbursal_amount = loan_type.disbursal_amount();
        self.tenure = loan_type.tenure;
        self.interest_rate = loan_type.interest_rate;
        self.documents = loan_type.documents.clone();
    }

    /// Apply explicit edits on top of the current terms.
    ///
    /// A percentage edit wins over a fractional rate edit sent in the same
    /// update, the same way the percentage view writes back into the rate.
    pub fn apply_terms(&mut self, terms: &LoanTerms) {
        if let Some(amount) = terms.loan_amount {
            self.loan_amount = amount;
        }
        if let Some(amount) = terms.disbursal_amount {
            self.disbursal_amount = amount;
        }
        if let Some(tenure) = terms.tenure {
            self.tenure = tenure;
        }
        if let Some(rate) = terms.interest_rate {
            self.interest_rate = rate;
        }
        if let Some(percentage) = terms.interest_rate_percentage {
            self.set_interest_rate_percentage(percentage);
        }
        if let Some(journal) = &terms.journal_id {
            self.journal_id = Some(journal.clone());
        }
        if let Some(account) = &terms.debit_account_id {
            self.debit_account_id = Some(account.clone());
        }
        if let Some(account) = &terms.credit_account_id {
            self.credit_account_id = Some(account.clone());
        }
    }
}

/// Payment state of a single installment
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentState {
    Unpaid,
    Invoiced,
    Paid,
}

/// One installment of a repayment schedule
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct RepaymentLine {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub name: String,
    pub partner_id: Uuid,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub interest_amount: Decimal,
    pub total_amount: Decimal,
    pub interest_account_id: String,
    pub repayment_account_id: String,
    pub state: RepaymentState,
}

/// Borrower record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

/// Editable loan terms, shared by creation and the terms update
#[derive(Debug, Default, Deserialize, Validate, Clone)]
pub struct LoanTerms {
    #[validate(custom = "amount_in_range")]
    pub loan_amount: Option<Decimal>,
    /// May be negative; the ledger entry then swaps sides
    pub disbursal_amount: Option<Decimal>,
    #[validate(range(min = 1, max = 600, message = "tenure must be between 1 and 600 periods"))]
    pub tenure: Option<i32>,
    #[validate(custom = "rate_in_range")]
    pub interest_rate: Option<Decimal>,
    #[validate(custom = "percentage_in_range")]
    pub interest_rate_percentage: Option<Decimal>,
    pub journal_id: Option<String>,
    pub debit_account_id: Option<String>,
    pub credit_account_id: Option<String>,
}

/// Request to open a new loan
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub partner_id: Uuid,
    pub loan_type_id: Uuid,
    #[validate(length(equal = 3, message = "currency must be an ISO 4217 code"))]
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    #[serde(flatten)]
    #[validate]
    pub terms: LoanTerms,
}

/// Request to define a loan type
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanTypeRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(custom = "amount_in_range")]
    pub loan_amount: Decimal,
    #[validate(range(min = 1, max = 600, message = "tenure must be between 1 and 600 periods"))]
    pub tenure: i32,
    #[serde(default = "default_tenure_plan")]
    pub tenure_plan: String,
    #[validate(custom = "rate_in_range")]
    pub interest_rate: Option<Decimal>,
    #[validate(custom = "percentage_in_range")]
    pub interest_rate_percentage: Option<Decimal>,
    #[serde(default)]
    #[validate(custom = "amount_in_range")]
    pub processing_fee: Decimal,
    #[serde(default)]
    pub documents: Vec<String>,
    pub note: Option<String>,
}

fn default_tenure_plan() -> String {
    "monthly".to_string()
}

/// Request to change the type of a draft loan
#[derive(Debug, Deserialize)]
pub struct ChangeLoanTypeRequest {
    pub loan_type_id: Uuid,
}

/// Rejection reason submitted by the reviewer
#[derive(Debug, Deserialize, Validate)]
pub struct RejectLoanRequest {
    #[validate(length(min = 1, message = "a rejection reason is required"))]
    pub reason: String,
}

/// Query for listing loans
#[derive(Debug, Deserialize, Default)]
pub struct ListLoansQuery {
    pub partner_id: Option<Uuid>,
    pub state: Option<LoanState>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Loan type as exposed over the API, with derived figures filled in
#[derive(Debug, Serialize)]
pub struct LoanTypeResponse {
    #[serde(flatten)]
    pub loan_type: LoanType,
    pub disbursal_amount: Decimal,
    pub interest_rate_percentage: Decimal,
}

impl From<LoanType> for LoanTypeResponse {
    fn from(loan_type: LoanType) -> Self {
        Self {
            disbursal_amount: loan_type.disbursal_amount(),
            interest_rate_percentage: loan_type.interest_rate_percentage(),
            loan_type,
        }
    }
}

/// Loan request as exposed over the API
#[derive(Debug, Serialize)]
pub struct LoanResponse {
    #[serde(flatten)]
    pub loan: LoanRequest,
    pub interest_rate_percentage: Decimal,
}

impl From<LoanRequest> for LoanResponse {
    fn from(loan: LoanRequest) -> Self {
        Self {
            interest_rate_percentage: loan.interest_rate_percentage(),
            loan,
        }
    }
}

/// Message shown to the user when a transition is refused by policy
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub title: String,
    pub message: String,
}

impl Advisory {
    pub fn repayment(message: &str) -> Self {
        Self {
            title: "Repayment".to_string(),
            message: message.to_string(),
        }
    }
}

/// Result of a lifecycle action
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum LoanAction {
    Applied { loan: LoanResponse },
    Advisory(Advisory),
}

impl LoanAction {
    pub fn applied(loan: LoanRequest) -> Self {
        LoanAction::Applied { loan: loan.into() }
    }

    pub fn advisory(&self) -> Option<&Advisory> {
        match self {
            LoanAction::Advisory(advisory) => Some(advisory),
            LoanAction::Applied { .. } => None,
        }
    }

    pub fn loan(&self) -> Option<&LoanRequest> {
        match self {
            LoanAction::Applied { loan } => Some(&loan.loan),
            LoanAction::Advisory(_) => None,
        }
    }
}

/// Prompt returned when a rejection is started; the reason follows separately
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RejectionPrompt {
    pub title: String,
    pub loan_id: Uuid,
    pub loan_reference: String,
}
