//! PostgreSQL record store

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::chrono::DateTime;
use uuid::Uuid;

use super::StoreError;
use crate::auth::UserStore;
use crate::ledger::{EntryState, JournalEntry, JournalEntryDraft, JournalLine, Ledger, LedgerError};
use crate::loan::{
    ListLoansQuery, LoanRequest, LoanState, LoanStore, LoanType, Partner, RepaymentLine,
    RepaymentState,
};
use crate::models::{NewUser, User};
use crate::notify::{Mail, Notifier, NotifyError};

/// Record store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn entry_lines(&self, entry_id: Uuid) -> Result<Vec<JournalLine>, StoreError> {
        let lines = sqlx::query_as::<_, JournalLine>(
            "SELECT name, account_id, debit, credit FROM journal_lines WHERE entry_id = $1 ORDER BY id",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    name: String,
    reference: String,
    narration: String,
    journal_id: String,
    date: NaiveDate,
    state: EntryState,
    created_at: DateTime<Utc>,
}

impl EntryRow {
    fn with_lines(self, lines: Vec<JournalLine>) -> JournalEntry {
        JournalEntry {
            id: self.id,
            name: self.name,
            reference: self.reference,
            narration: self.narration,
            journal_id: self.journal_id,
            date: self.date,
            state: self.state,
            lines,
            created_at: self.created_at,
        }
    }
}

const INSERT_USER: &str = r#"
    INSERT INTO users (
        id, login, name, email, role, active,
        oauth_provider_id, oauth_uid, oauth_access_token, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING *
"#;

fn insert_user_query(
    user: &User,
) -> sqlx::query::QueryAs<'_, sqlx::Postgres, User, sqlx::postgres::PgArguments> {
    sqlx::query_as::<_, User>(INSERT_USER)
        .bind(user.id)
        .bind(&user.login)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.active)
        .bind(&user.oauth_provider_id)
        .bind(&user.oauth_uid)
        .bind(&user.oauth_access_token)
        .bind(user.created_at)
        .bind(user.updated_at)
}

#[async_trait]
impl LoanStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn next_sequence(&self, code: &str) -> Result<String, StoreError> {
        let row = sqlx::query_as::<_, (String, i32, i64)>(
            r#"
            UPDATE sequences
            SET next_number = next_number + 1
            WHERE code = $1
            RETURNING prefix, padding, next_number - 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let (prefix, padding, number) =
            row.ok_or_else(|| StoreError::NotFound(format!("sequence {}", code)))?;
        Ok(format!(
            "{}{:0width$}",
            prefix,
            number,
            width = padding.max(0) as usize
        ))
    }

    async fn insert_loan_type(&self, loan_type: &LoanType) -> Result<LoanType, StoreError> {
        let stored = sqlx::query_as::<_, LoanType>(
            r#"
            INSERT INTO loan_types (
                id, name, loan_amount, tenure, tenure_plan, interest_rate,
                processing_fee, documents, note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(loan_type.id)
        .bind(&loan_type.name)
        .bind(loan_type.loan_amount)
        .bind(loan_type.tenure)
        .bind(&loan_type.tenure_plan)
        .bind(loan_type.interest_rate)
        .bind(loan_type.processing_fee)
        .bind(&loan_type.documents)
        .bind(&loan_type.note)
        .bind(loan_type.created_at)
        .bind(loan_type.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get_loan_type(&self, id: Uuid) -> Result<Option<LoanType>, StoreError> {
        let loan_type = sqlx::query_as::<_, LoanType>("SELECT * FROM loan_types WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan_type)
    }

    async fn list_loan_types(&self) -> Result<Vec<LoanType>, StoreError> {
        let types = sqlx::query_as::<_, LoanType>("SELECT * FROM loan_types ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(types)
    }

    async fn get_partner(&self, id: Uuid) -> Result<Option<Partner>, StoreError> {
        let partner = sqlx::query_as::<_, Partner>("SELECT * FROM partners WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(partner)
    }

    async fn insert_loan(&self, loan: &LoanRequest) -> Result<LoanRequest, StoreError> {
        let stored = sqlx::query_as::<_, LoanRequest>(
            r#"
            INSERT INTO loan_requests (
                id, reference, partner_id, currency, loan_type_id, loan_amount,
                disbursal_amount, tenure, interest_rate, issue_date, state,
                reject_reason, schedule_computed, journal_id, debit_account_id,
                credit_account_id, documents, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(&loan.reference)
        .bind(loan.partner_id)
        .bind(&loan.currency)
        .bind(loan.loan_type_id)
        .bind(loan.loan_amount)
        .bind(loan.disbursal_amount)
        .bind(loan.tenure)
        .bind(loan.interest_rate)
        .bind(loan.issue_date)
        .bind(loan.state)
        .bind(&loan.reject_reason)
        .bind(loan.schedule_computed)
        .bind(&loan.journal_id)
        .bind(&loan.debit_account_id)
        .bind(&loan.credit_account_id)
        .bind(&loan.documents)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<LoanRequest>, StoreError> {
        let loan = sqlx::query_as::<_, LoanRequest>("SELECT * FROM loan_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn list_loans(&self, query: &ListLoansQuery) -> Result<Vec<LoanRequest>, StoreError> {
        let page = query.page.unwrap_or(1).max(1) as i64;
        let limit = query.limit.unwrap_or(20).clamp(1, 100) as i64;

        let loans = sqlx::query_as::<_, LoanRequest>(
            r#"
            SELECT * FROM loan_requests
            WHERE ($1::uuid IS NULL OR partner_id = $1)
              AND ($2::loan_state IS NULL OR state = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.partner_id)
        .bind(query.state)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn find_partner_loans(
        &self,
        partner_id: Uuid,
        states: &[LoanState],
    ) -> Result<Vec<LoanRequest>, StoreError> {
        let states: Vec<&str> = states.iter().map(LoanState::as_str).collect();
        let loans = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE partner_id = $1 AND state::text = ANY($2)",
        )
        .bind(partner_id)
        .bind(&states)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn update_loan(&self, loan: &LoanRequest) -> Result<LoanRequest, StoreError> {
        let stored = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests SET
                loan_type_id = $2, loan_amount = $3, disbursal_amount = $4,
                tenure = $5, interest_rate = $6, issue_date = $7, state = $8,
                reject_reason = $9, journal_id = $10, debit_account_id = $11,
                credit_account_id = $12, documents = $13, currency = $14,
                updated_at = $15
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(loan.loan_type_id)
        .bind(loan.loan_amount)
        .bind(loan.disbursal_amount)
        .bind(loan.tenure)
        .bind(loan.interest_rate)
        .bind(loan.issue_date)
        .bind(loan.state)
        .bind(&loan.reject_reason)
        .bind(&loan.journal_id)
        .bind(&loan.debit_account_id)
        .bind(&loan.credit_account_id)
        .bind(&loan.documents)
        .bind(&loan.currency)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        stored.ok_or_else(|| StoreError::NotFound(format!("loan {}", loan.id)))
    }

    async fn replace_schedule(
        &self,
        loan_id: Uuid,
        lines: &[RepaymentLine],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let flagged = sqlx::query(
            "UPDATE loan_requests SET schedule_computed = TRUE, updated_at = $2 WHERE id = $1",
        )
        .bind(loan_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        if flagged.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("loan {}", loan_id)));
        }

        sqlx::query("DELETE FROM repayment_lines WHERE loan_id = $1")
            .bind(loan_id)
            .execute(&mut *tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO repayment_lines (
                    id, loan_id, name, partner_id, due_date, amount, interest_amount,
                    total_amount, interest_account_id, repayment_account_id, state
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(line.id)
            .bind(line.loan_id)
            .bind(&line.name)
            .bind(line.partner_id)
            .bind(line.due_date)
            .bind(line.amount)
            .bind(line.interest_amount)
            .bind(line.total_amount)
            .bind(&line.interest_account_id)
            .bind(&line.repayment_account_id)
            .bind(line.state)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_repayment_lines(&self, loan_id: Uuid) -> Result<Vec<RepaymentLine>, StoreError> {
        let lines = sqlx::query_as::<_, RepaymentLine>(
            "SELECT * FROM repayment_lines WHERE loan_id = $1 ORDER BY due_date",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    async fn set_repayment_state(
        &self,
        line_id: Uuid,
        state: RepaymentState,
    ) -> Result<Option<RepaymentLine>, StoreError> {
        let line = sqlx::query_as::<_, RepaymentLine>(
            "UPDATE repayment_lines SET state = $2 WHERE id = $1 RETURNING *",
        )
        .bind(line_id)
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;
        Ok(line)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = user.into_user();
        Ok(insert_user_query(&user).fetch_one(&self.pool).await?)
    }

    async fn link_oauth(
        &self,
        user_id: Uuid,
        provider_id: &str,
        oauth_uid: &str,
        access_token: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET oauth_provider_id = $2, oauth_uid = $3, oauth_access_token = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(provider_id)
        .bind(oauth_uid)
        .bind(access_token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    async fn find_users_by_oauth(
        &self,
        provider_id: &str,
        oauth_uid: &str,
    ) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE oauth_provider_id = $1 AND oauth_uid = $2",
        )
        .bind(provider_id)
        .bind(oauth_uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update_access_token(
        &self,
        user_id: Uuid,
        access_token: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET oauth_access_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(access_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn signup_with_token(&self, token: &str, user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let redeemed = sqlx::query_as::<_, (Option<Uuid>,)>(
            r#"
            UPDATE signup_tokens SET used_at = NOW()
            WHERE token = $1
              AND used_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING user_id
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let created = match redeemed {
            None => return Err(StoreError::NotFound("signup token".to_string())),
            Some((Some(user_id),)) => sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET oauth_provider_id = $2, oauth_uid = $3, oauth_access_token = $4, updated_at = $5
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(user_id)
            .bind(&user.oauth_provider_id)
            .bind(&user.oauth_uid)
            .bind(&user.oauth_access_token)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?,
            Some((None,)) => {
                let user = user.into_user();
                insert_user_query(&user).fetch_one(&mut *tx).await?
            }
        };

        tx.commit().await?;
        Ok(created)
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn create_entry(&self, draft: JournalEntryDraft) -> Result<JournalEntry, LedgerError> {
        draft.validate()?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            INSERT INTO journal_entries (id, name, reference, narration, journal_id, date, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&draft.name)
        .bind(&draft.reference)
        .bind(&draft.narration)
        .bind(&draft.journal_id)
        .bind(draft.date)
        .bind(EntryState::Draft)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        for line in &draft.lines {
            sqlx::query(
                r#"
                INSERT INTO journal_lines (entry_id, name, account_id, debit, credit)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(row.id)
            .bind(&line.name)
            .bind(&line.account_id)
            .bind(line.debit)
            .bind(line.credit)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(row.with_lines(draft.lines))
    }

    async fn post_entry(&self, entry_id: Uuid) -> Result<JournalEntry, LedgerError> {
        let posted = sqlx::query_as::<_, EntryRow>(
            r#"
            UPDATE journal_entries SET state = 'posted'
            WHERE id = $1 AND state = 'draft'
            RETURNING *
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let Some(row) = posted else {
            let exists = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM journal_entries WHERE id = $1")
                .bind(entry_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?;
            return Err(match exists {
                Some(_) => LedgerError::AlreadyPosted(entry_id),
                None => LedgerError::EntryNotFound(entry_id),
            });
        };

        let lines = self.entry_lines(entry_id).await?;
        Ok(row.with_lines(lines))
    }
}

#[async_trait]
impl Notifier for PgStore {
    async fn send(&self, mail: Mail) -> Result<(), NotifyError> {
        if mail.email_to.is_empty() {
            return Err(NotifyError::MissingRecipient);
        }

        sqlx::query(
            r#"
            INSERT INTO mail_outbox (id, email_from, email_to, subject, body_html, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&mail.email_from)
        .bind(&mail.email_to)
        .bind(&mail.subject)
        .bind(&mail.body_html)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        tracing::debug!(to = %mail.email_to, subject = %mail.subject, "Mail queued in outbox");
        Ok(())
    }
}
