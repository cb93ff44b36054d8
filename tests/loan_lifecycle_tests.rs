//! Loan lifecycle tests against the in-memory store

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use uuid::Uuid;

    use loandesk_server::ledger::EntryState;
    use loandesk_server::loan::{
        CreateLoanRequest, CreateLoanTypeRequest, LoanError, LoanService, LoanSettings,
        LoanState, LoanTerms, LoanType, Partner, RepaymentState,
    };
    use loandesk_server::store::MemoryStore;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: LoanService,
        partner: Partner,
        loan_type: LoanType,
    }

    async fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = LoanService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            LoanSettings {
                mail_sender: "loans@example.com".to_string(),
                interest_account_id: "7700".to_string(),
                repayment_account_id: "2200".to_string(),
            },
        );

        let partner = Partner {
            id: Uuid::new_v4(),
            name: "Jane Doe".to_string(),
            email: Some("jane@example.com".to_string()),
        };
        store.add_partner(partner.clone()).await;

        let loan_type = service
            .create_loan_type(CreateLoanTypeRequest {
                name: "Personal".to_string(),
                loan_amount: dec("12000"),
                tenure: 12,
                tenure_plan: "monthly".to_string(),
                interest_rate: None,
                interest_rate_percentage: Some(dec("4.69")),
                processing_fee: dec("200"),
                documents: vec!["ID card".to_string()],
                note: None,
            })
            .await
            .unwrap();

        Fixture {
            store,
            service,
            partner,
            loan_type,
        }
    }

    fn loan_request(fixture: &Fixture, terms: LoanTerms) -> CreateLoanRequest {
        CreateLoanRequest {
            partner_id: fixture.partner.id,
            loan_type_id: fixture.loan_type.id,
            currency: "usd".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            terms,
        }
    }

    fn ledger_terms() -> LoanTerms {
        LoanTerms {
            journal_id: Some("LOANS".to_string()),
            debit_account_id: Some("1100".to_string()),
            credit_account_id: Some("1010".to_string()),
            ..LoanTerms::default()
        }
    }

    #[tokio::test]
    async fn test_create_loan_takes_type_defaults() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        assert_eq!(loan.reference, "LOAN/00001");
        assert_eq!(loan.state, LoanState::Draft);
        assert_eq!(loan.currency, "USD");
        assert_eq!(loan.loan_amount, dec("12000"));
        assert_eq!(loan.disbursal_amount, dec("11800"));
        assert_eq!(loan.tenure, 12);
        assert_eq!(loan.interest_rate, dec("0.0469"));
        assert_eq!(loan.interest_rate_percentage(), dec("4.69"));
        assert_eq!(loan.documents, vec!["ID card".to_string()]);
        assert!(!loan.schedule_computed);
    }

    #[tokio::test]
    async fn test_explicit_terms_override_type_defaults() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(
                &fixture,
                LoanTerms {
                    loan_amount: Some(dec("6000")),
                    tenure: Some(6),
                    interest_rate_percentage: Some(dec("2.5")),
                    ..LoanTerms::default()
                },
            ))
            .await
            .unwrap();

        assert_eq!(loan.loan_amount, dec("6000"));
        assert_eq!(loan.tenure, 6);
        assert_eq!(loan.interest_rate, dec("0.025"));
    }

    #[tokio::test]
    async fn test_unknown_partner_is_refused() {
        let fixture = setup().await;
        let mut request = loan_request(&fixture, LoanTerms::default());
        request.partner_id = Uuid::new_v4();

        assert!(matches!(
            fixture.service.create_loan(request).await,
            Err(LoanError::PartnerNotFound(_))
        ));
    }

    /// Walk a fresh loan of the fixture partner forward until it reaches `target`
    async fn drive_to(fixture: &Fixture, target: LoanState) -> Uuid {
        let loan = fixture
            .service
            .create_loan(loan_request(fixture, ledger_terms()))
            .await
            .unwrap();
        let service = &fixture.service;

        let steps = [
            LoanState::Confirmed,
            LoanState::Waiting,
            LoanState::Approved,
            LoanState::Disbursed,
        ];
        for step in steps {
            match step {
                LoanState::Confirmed => {
                    service.confirm(loan.id).await.unwrap();
                }
                LoanState::Waiting => {
                    service.compute_repayment(loan.id).await.unwrap();
                    service.request_approval(loan.id).await.unwrap();
                }
                LoanState::Approved => {
                    service.approve(loan.id).await.unwrap();
                }
                _ => {
                    service.disburse(loan.id).await.unwrap();
                }
            }
            if step == target {
                break;
            }
        }

        assert_eq!(service.get_loan(loan.id).await.unwrap().state, target);
        loan.id
    }

    #[tokio::test]
    async fn test_draft_does_not_block_new_request() {
        let fixture = setup().await;
        for _ in 0..2 {
            assert!(fixture
                .service
                .create_loan(loan_request(&fixture, LoanTerms::default()))
                .await
                .is_ok());
        }
    }

    #[tokio::test]
    async fn test_ongoing_loan_blocks_new_request() {
        for state in [
            LoanState::Confirmed,
            LoanState::Waiting,
            LoanState::Approved,
            LoanState::Disbursed,
        ] {
            let fixture = setup().await;
            drive_to(&fixture, state).await;

            match fixture
                .service
                .create_loan(loan_request(&fixture, LoanTerms::default()))
                .await
            {
                Err(LoanError::PolicyViolation(msg)) => {
                    assert_eq!(msg, "The partner has already an ongoing loan.")
                }
                other => panic!("{} loan should block, got {:?}", state, other),
            }
        }
    }

    #[tokio::test]
    async fn test_out_of_range_terms_are_refused() {
        let fixture = setup().await;
        let oversized = [
            LoanTerms {
                tenure: Some(6_000_000),
                ..LoanTerms::default()
            },
            LoanTerms {
                loan_amount: Some(dec("1000000000000000000000")),
                ..LoanTerms::default()
            },
            LoanTerms {
                interest_rate: Some(dec("1000000000")),
                ..LoanTerms::default()
            },
        ];

        for terms in oversized {
            assert!(matches!(
                fixture
                    .service
                    .create_loan(loan_request(&fixture, terms))
                    .await,
                Err(LoanError::Validation(_))
            ));
        }

        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        assert!(matches!(
            fixture
                .service
                .update_terms(
                    loan.id,
                    LoanTerms {
                        tenure: Some(601),
                        ..LoanTerms::default()
                    },
                )
                .await,
            Err(LoanError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_loan_type_is_refused() {
        let fixture = setup().await;
        let result = fixture
            .service
            .create_loan_type(CreateLoanTypeRequest {
                name: "Huge".to_string(),
                loan_amount: dec("1000000000000000000000"),
                tenure: i32::MAX,
                tenure_plan: "monthly".to_string(),
                interest_rate: Some(dec("1000000000")),
                interest_rate_percentage: None,
                processing_fee: Decimal::ZERO,
                documents: Vec::new(),
                note: None,
            })
            .await;
        assert!(matches!(result, Err(LoanError::Validation(_))));

        let negative = fixture
            .service
            .create_loan_type(CreateLoanTypeRequest {
                name: "Negative".to_string(),
                loan_amount: dec("-100"),
                tenure: 12,
                tenure_plan: "monthly".to_string(),
                interest_rate: None,
                interest_rate_percentage: None,
                processing_fee: Decimal::ZERO,
                documents: Vec::new(),
                note: None,
            })
            .await;
        assert!(matches!(negative, Err(LoanError::Validation(_))));
    }

    #[tokio::test]
    async fn test_stored_type_out_of_range_never_reaches_schedule() {
        let fixture = setup().await;
        let mut huge = fixture.loan_type.clone();
        huge.id = Uuid::new_v4();
        huge.loan_amount = dec("1000000000000000000000");
        huge.interest_rate = dec("1000000000");
        fixture.store.put_loan_type(huge.clone()).await;

        let mut request = loan_request(&fixture, LoanTerms::default());
        request.loan_type_id = huge.id;
        assert!(matches!(
            fixture.service.create_loan(request).await,
            Err(LoanError::Validation(_))
        ));

        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        assert!(matches!(
            fixture.service.change_loan_type(loan.id, huge.id).await,
            Err(LoanError::Validation(_))
        ));
        let lines = fixture.service.compute_repayment(loan.id).await.unwrap();
        assert_eq!(lines.len(), 12);
    }

    #[tokio::test]
    async fn test_rejected_loan_does_not_block_new_request() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        fixture.service.confirm(loan.id).await.unwrap();
        fixture
            .service
            .reject_with_reason(loan.id, "Insufficient income")
            .await
            .unwrap();

        assert!(fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_compute_repayment_builds_flat_schedule() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        let lines = fixture.service.compute_repayment(loan.id).await.unwrap();
        assert_eq!(lines.len(), 12);

        let first = &lines[0];
        assert_eq!(first.name, "LOAN/00001/1");
        assert_eq!(first.due_date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
        assert_eq!(first.amount, dec("1000"));
        assert_eq!(first.interest_amount, dec("46.9"));
        assert_eq!(first.total_amount, dec("1046.9"));
        assert_eq!(first.interest_account_id, "7700");
        assert_eq!(first.repayment_account_id, "2200");
        assert_eq!(first.state, RepaymentState::Unpaid);
        assert!(lines.iter().all(|l| l.total_amount == first.total_amount));
        assert_eq!(
            lines.last().unwrap().due_date,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );

        let principal: Decimal = lines.iter().map(|l| l.amount).sum();
        assert_eq!(principal, dec("12000"));

        let loan = fixture.service.get_loan(loan.id).await.unwrap();
        assert!(loan.schedule_computed);
    }

    #[tokio::test]
    async fn test_recompute_replaces_lines() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        fixture.service.compute_repayment(loan.id).await.unwrap();
        fixture
            .service
            .update_terms(
                loan.id,
                LoanTerms {
                    tenure: Some(3),
                    ..LoanTerms::default()
                },
            )
            .await
            .unwrap();
        let lines = fixture.service.compute_repayment(loan.id).await.unwrap();

        assert_eq!(lines.len(), 3);
        let stored = fixture.service.repayment_lines(loan.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].amount, dec("4000"));
    }

    #[tokio::test]
    async fn test_unknown_cadence_is_configuration_error() {
        let fixture = setup().await;
        let mut broken = fixture.loan_type.clone();
        broken.tenure_plan = "weekly".to_string();
        fixture.store.put_loan_type(broken).await;

        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        assert!(matches!(
            fixture.service.compute_repayment(loan.id).await,
            Err(LoanError::Configuration(_))
        ));
        assert!(fixture
            .service
            .repayment_lines(loan.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_cadence_refused_on_type_creation() {
        let fixture = setup().await;
        let result = fixture
            .service
            .create_loan_type(CreateLoanTypeRequest {
                name: "Weekly".to_string(),
                loan_amount: dec("100"),
                tenure: 4,
                tenure_plan: "weekly".to_string(),
                interest_rate: None,
                interest_rate_percentage: None,
                processing_fee: Decimal::ZERO,
                documents: Vec::new(),
                note: None,
            })
            .await;
        assert!(matches!(result, Err(LoanError::Validation(_))));
    }

    #[tokio::test]
    async fn test_request_approval_requires_schedule() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        fixture.service.confirm(loan.id).await.unwrap();

        let action = fixture.service.request_approval(loan.id).await.unwrap();
        let advisory = action.advisory().expect("advisory expected");
        assert_eq!(advisory.title, "Repayment");
        assert_eq!(advisory.message, "Compute the repayments before requesting");

        let loan = fixture.service.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.state, LoanState::Confirmed);

        fixture.service.compute_repayment(loan.id).await.unwrap();
        let action = fixture.service.request_approval(loan.id).await.unwrap();
        assert_eq!(action.loan().unwrap().state, LoanState::Waiting);
    }

    #[tokio::test]
    async fn test_confirm_sends_mail() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        let action = fixture.service.confirm(loan.id).await.unwrap();
        assert_eq!(action.loan().unwrap().state, LoanState::Confirmed);

        let mails = fixture.store.sent_mails().await;
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].email_to, "jane@example.com");
        assert_eq!(mails[0].email_from, "loans@example.com");
        assert_eq!(mails[0].subject, "Loan Confirmation");
        assert!(mails[0].body_html.contains("LOAN/00001"));
    }

    #[tokio::test]
    async fn test_confirm_without_partner_email_still_confirms() {
        let fixture = setup().await;
        let silent = Partner {
            id: Uuid::new_v4(),
            name: "No Mail".to_string(),
            email: None,
        };
        fixture.store.add_partner(silent.clone()).await;

        let mut request = loan_request(&fixture, LoanTerms::default());
        request.partner_id = silent.id;
        let loan = fixture.service.create_loan(request).await.unwrap();

        let action = fixture.service.confirm(loan.id).await.unwrap();
        assert_eq!(action.loan().unwrap().state, LoanState::Confirmed);
        assert!(fixture.store.sent_mails().await.is_empty());
    }

    #[tokio::test]
    async fn test_terms_locked_after_draft() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        fixture.service.confirm(loan.id).await.unwrap();

        let result = fixture
            .service
            .update_terms(
                loan.id,
                LoanTerms {
                    tenure: Some(24),
                    ..LoanTerms::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(LoanError::NotEditable(LoanState::Confirmed))
        ));

        let result = fixture
            .service
            .change_loan_type(loan.id, fixture.loan_type.id)
            .await;
        assert!(matches!(result, Err(LoanError::NotEditable(_))));
    }

    #[tokio::test]
    async fn test_illegal_transition_is_refused() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        assert!(matches!(
            fixture.service.approve(loan.id).await,
            Err(LoanError::InvalidTransition {
                from: LoanState::Draft,
                to: LoanState::Approved
            })
        ));
        assert!(matches!(
            fixture.service.close(loan.id).await,
            Err(LoanError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle_to_closed() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, ledger_terms()))
            .await
            .unwrap();

        fixture.service.confirm(loan.id).await.unwrap();
        let lines = fixture.service.compute_repayment(loan.id).await.unwrap();
        fixture.service.request_approval(loan.id).await.unwrap();
        fixture.service.approve(loan.id).await.unwrap();

        let action = fixture.service.disburse(loan.id).await.unwrap();
        assert_eq!(action.loan().unwrap().state, LoanState::Disbursed);

        let entries = fixture.store.journal_entries().await;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.state, EntryState::Posted);
        assert_eq!(entry.reference, "LOAN/00001");
        assert_eq!(entry.journal_id, "LOANS");
        assert_eq!(entry.lines[0].account_id, "1100");
        assert_eq!(entry.lines[0].debit, dec("11800"));
        assert_eq!(entry.lines[0].name, "Jane Doe");
        assert_eq!(entry.lines[1].account_id, "1010");
        assert_eq!(entry.lines[1].credit, dec("11800"));

        let action = fixture.service.close(loan.id).await.unwrap();
        let advisory = action.advisory().expect("pending repayments");
        assert_eq!(advisory.message, "Pending Repayments");

        for line in &lines {
            fixture
                .service
                .mark_line_paid(loan.id, line.id)
                .await
                .unwrap();
        }

        let action = fixture.service.close(loan.id).await.unwrap();
        assert_eq!(action.loan().unwrap().state, LoanState::Closed);

        // A closed loan no longer blocks the partner
        assert!(fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_disburse_requires_ledger_accounts() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        fixture.service.confirm(loan.id).await.unwrap();
        fixture.service.compute_repayment(loan.id).await.unwrap();
        fixture.service.request_approval(loan.id).await.unwrap();
        fixture.service.approve(loan.id).await.unwrap();

        assert!(matches!(
            fixture.service.disburse(loan.id).await,
            Err(LoanError::Validation(_))
        ));
        assert!(fixture.store.journal_entries().await.is_empty());
        let loan = fixture.service.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.state, LoanState::Approved);
    }

    #[tokio::test]
    async fn test_rejection_needs_reason() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();

        let prompt = fixture.service.begin_rejection(loan.id).await.unwrap();
        assert_eq!(prompt.loan_reference, "LOAN/00001");
        let unchanged = fixture.service.get_loan(loan.id).await.unwrap();
        assert_eq!(unchanged.state, LoanState::Draft);

        assert!(matches!(
            fixture.service.reject_with_reason(loan.id, "   ").await,
            Err(LoanError::Validation(_))
        ));

        let action = fixture
            .service
            .reject_with_reason(loan.id, "Missing documents")
            .await
            .unwrap();
        let rejected = action.loan().unwrap();
        assert_eq!(rejected.state, LoanState::Rejected);
        assert_eq!(rejected.reject_reason.as_deref(), Some("Missing documents"));
    }

    #[tokio::test]
    async fn test_schedule_locked_once_approved() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        fixture.service.compute_repayment(loan.id).await.unwrap();
        fixture.service.request_approval(loan.id).await.unwrap();
        fixture.service.approve(loan.id).await.unwrap();

        assert!(matches!(
            fixture.service.compute_repayment(loan.id).await,
            Err(LoanError::NotEditable(LoanState::Approved))
        ));
    }

    #[tokio::test]
    async fn test_mark_line_of_other_loan_is_refused() {
        let fixture = setup().await;
        let loan = fixture
            .service
            .create_loan(loan_request(&fixture, LoanTerms::default()))
            .await
            .unwrap();
        fixture.service.compute_repayment(loan.id).await.unwrap();

        assert!(matches!(
            fixture.service.mark_line_paid(loan.id, Uuid::new_v4()).await,
            Err(LoanError::RepaymentLineNotFound(_))
        ));
    }
}
