//! Persistence seam for loan records

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{
    ListLoansQuery, LoanRequest, LoanType, Partner, RepaymentLine, RepaymentState,
};
use super::state::LoanState;
use crate::store::StoreError;

/// Record store operations needed by the loan lifecycle
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Cheap connectivity probe used by the health endpoint
    async fn ping(&self) -> Result<(), StoreError>;

    /// Allocate the next value of a named sequence
    async fn next_sequence(&self, code: &str) -> Result<String, StoreError>;

    async fn insert_loan_type(&self, loan_type: &LoanType) -> Result<LoanType, StoreError>;

    async fn get_loan_type(&self, id: Uuid) -> Result<Option<LoanType>, StoreError>;

    async fn list_loan_types(&self) -> Result<Vec<LoanType>, StoreError>;

    async fn get_partner(&self, id: Uuid) -> Result<Option<Partner>, StoreError>;

    async fn insert_loan(&self, loan: &LoanRequest) -> Result<LoanRequest, StoreError>;

    async fn get_loan(&self, id: Uuid) -> Result<Option<LoanRequest>, StoreError>;

    async fn list_loans(&self, query: &ListLoansQuery) -> Result<Vec<LoanRequest>, StoreError>;

    /// Loans of a partner whose state is one of `states`
    async fn find_partner_loans(
        &self,
        partner_id: Uuid,
        states: &[LoanState],
    ) -> Result<Vec<LoanRequest>, StoreError>;

    /// Persist every editable field of an existing loan
    async fn update_loan(&self, loan: &LoanRequest) -> Result<LoanRequest, StoreError>;

    /// Drop all repayment lines of a loan, insert `lines` and flag the
    /// schedule as computed, as one unit
    async fn replace_schedule(
        &self,
        loan_id: Uuid,
        lines: &[RepaymentLine],
    ) -> Result<(), StoreError>;

    async fn list_repayment_lines(&self, loan_id: Uuid) -> Result<Vec<RepaymentLine>, StoreError>;

    async fn set_repayment_state(
        &self,
        line_id: Uuid,
        state: RepaymentState,
    ) -> Result<Option<RepaymentLine>, StoreError>;
}
