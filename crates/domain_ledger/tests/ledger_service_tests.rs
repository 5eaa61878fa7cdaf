//! Service-level tests for domain_ledger

use chrono::Duration;

use core_kernel::{Clock, Money, StudentId};
use domain_ledger::{
    Actor, ActorRole, AdjustmentKind, AdjustmentRequest, ItemChange, ItemStatus, LedgerError,
    LedgerStatus, NotifyTarget, PaymentMethod, PaymentRequest,
};
use test_utils::{
    assert_allocation_balances, assert_err, assert_err_variant, assert_item, assert_item_order,
    assert_ledger_invariants, assert_ledger_totals, assert_ok, CatalogFixtures, IdFixtures,
    StudentFixtures, TestCatalogBuilder, TestCustomFeeBuilder, TestHarness, TestHarnessBuilder,
    TestStudentBuilder,
};

/// One class C1 student and a catalog with a single 5000 term
async fn single_term_harness() -> TestHarness {
    let catalog = TestCatalogBuilder::new()
        .with_term("T1", "Term 1", &[("C1", 5_000)])
        .build();
    TestHarnessBuilder::new()
        .with_catalog(catalog)
        .with_student(StudentFixtures::day_scholar(1))
        .build()
        .await
}

fn student() -> StudentId {
    IdFixtures::student(1)
}

fn payment(amount: i64) -> PaymentRequest {
    PaymentRequest::new(
        student(),
        IdFixtures::year(),
        Money::from_minor(amount),
        PaymentMethod::Cash,
    )
}

fn adjustment(changes: Vec<ItemChange>, actor: Actor) -> AdjustmentRequest {
    AdjustmentRequest {
        student_id: student(),
        year_id: IdFixtures::year(),
        changes,
        reason: "Sibling discount".to_string(),
        actor,
    }
}

// ============================================================================
// Walkthrough of a single term's lifecycle
// ============================================================================

mod term_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_full_lifecycle_of_one_term() {
        let harness = single_term_harness().await;
        let year = harness.year();

        // New ledger with one pending term
        let ledger = assert_ok!(harness.service.reconcile_student(&student(), &year).await);
        assert_item(&ledger, "TERM_T1", 5_000, 0, ItemStatus::Pending);
        assert_ledger_totals(&ledger, 5_000, 0, LedgerStatus::Pending);

        // Part payment
        assert_ok!(harness.service.apply_payment(payment(3_000)).await);
        let ledger = assert_ok!(harness.service.get_ledger(&student(), &year).await);
        assert_item(&ledger, "TERM_T1", 5_000, 3_000, ItemStatus::Partial);
        assert_ledger_totals(&ledger, 5_000, 3_000, LedgerStatus::Pending);

        // Settles the term
        assert_ok!(harness.service.apply_payment(payment(2_000)).await);
        let paid = assert_ok!(harness.service.get_ledger(&student(), &year).await);
        assert_item(&paid, "TERM_T1", 5_000, 5_000, ItemStatus::Paid);
        assert_ledger_totals(&paid, 5_000, 5_000, LedgerStatus::Paid);

        // Nothing left to pay
        let result = harness.service.apply_payment(payment(1)).await;
        assert_err_variant!(result, LedgerError::Overpayment { .. });
        assert_eq!(harness.service.get_ledger(&student(), &year).await.unwrap(), paid);

        // Discount below what was paid
        let result = harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::discount("TERM_T1", Money::from_minor(1_000))],
                Actor::admin("bursar"),
            ))
            .await;
        match result {
            Err(LedgerError::InvalidAdjustment {
                item_id,
                new_amount,
                paid_amount,
            }) => {
                assert_eq!(item_id.as_str(), "TERM_T1");
                assert_eq!(new_amount, Money::from_minor(4_000));
                assert_eq!(paid_amount, Money::from_minor(5_000));
            }
            other => panic!("expected InvalidAdjustment, got {:?}", other),
        }
        assert_eq!(harness.service.get_ledger(&student(), &year).await.unwrap(), paid);

        // The paid term survives its deactivation
        let deactivated = TestCatalogBuilder::new()
            .with_term("T1", "Term 1", &[("C1", 5_000)])
            .deactivate_term("T1")
            .build();
        harness.reference.upsert_catalog(deactivated).await;
        let after = assert_ok!(harness.service.reconcile_student(&student(), &year).await);
        assert_eq!(after, paid);
        assert_ledger_invariants(&after);
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

mod reconciliation {
    use super::*;

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        let harness = TestHarness::with_students(vec![StudentFixtures::bus_rider(1)]).await;
        let year = harness.year();

        let first = harness.service.reconcile_student(&student(), &year).await.unwrap();
        let version = harness.stored_version(&student()).await;
        harness.clock.advance(Duration::hours(6));
        let second = harness.service.reconcile_student(&student(), &year).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.updated_at, first.updated_at);
        assert_eq!(harness.stored_version(&student()).await, version);
    }

    #[tokio::test]
    async fn test_items_are_grouped_term_custom_transport() {
        let catalog = TestCatalogBuilder::standard()
            .with_custom_fee(CatalogFixtures::exam_fee())
            .build();
        let harness = TestHarnessBuilder::new()
            .with_catalog(catalog)
            .with_student(StudentFixtures::bus_rider(1))
            .build()
            .await;

        let ledger = harness
            .service
            .reconcile_student(&student(), &harness.year())
            .await
            .unwrap();

        assert_item_order(&ledger, &["TERM_T1", "TERM_T2", "CUSTOM_EXAM", "TRANSPORT_FEE"]);
        assert_ledger_totals(&ledger, 500_000 + 300_000 + 25_000 + 120_000, 0, LedgerStatus::Pending);
        assert_ledger_invariants(&ledger);
    }

    #[tokio::test]
    async fn test_unpaid_items_follow_catalog_changes() {
        let harness = TestHarness::with_students(vec![StudentFixtures::bus_rider(1)]).await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let catalog = TestCatalogBuilder::standard()
            .reprice_term("T1", "C1", 550_000)
            .deactivate_term("T2")
            .without_transport()
            .build();
        harness.reference.upsert_catalog(catalog).await;
        let ledger = harness.service.reconcile_student(&student(), &year).await.unwrap();

        assert_item_order(&ledger, &["TERM_T1"]);
        assert_item(&ledger, "TERM_T1", 550_000, 0, ItemStatus::Pending);
        assert_ledger_totals(&ledger, 550_000, 0, LedgerStatus::Pending);
    }

    #[tokio::test]
    async fn test_paid_items_are_frozen_against_repricing() {
        let harness = TestHarness::with_students(vec![StudentFixtures::day_scholar(1)]).await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();
        harness.service.apply_payment(payment(100_000)).await.unwrap();

        let catalog = TestCatalogBuilder::standard()
            .reprice_term("T1", "C1", 1_000)
            .reprice_term("T2", "C1", 350_000)
            .build();
        harness.reference.upsert_catalog(catalog).await;
        let ledger = harness.service.reconcile_student(&student(), &year).await.unwrap();

        assert_item(&ledger, "TERM_T1", 500_000, 100_000, ItemStatus::Partial);
        assert_item(&ledger, "TERM_T2", 350_000, 0, ItemStatus::Pending);
        assert_ledger_invariants(&ledger);
    }

    #[tokio::test]
    async fn test_transport_added_when_student_starts_riding() {
        let harness = TestHarness::with_students(vec![StudentFixtures::day_scholar(1)]).await;
        let year = harness.year();
        let before = harness.service.reconcile_student(&student(), &year).await.unwrap();
        assert!(!before.items.iter().any(|i| i.id.as_str() == "TRANSPORT_FEE"));

        harness.reference.upsert_student(StudentFixtures::bus_rider(1)).await;
        let after = harness.service.reconcile_student(&student(), &year).await.unwrap();

        assert_item(&after, "TRANSPORT_FEE", 120_000, 0, ItemStatus::Pending);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_student_without_class_is_rejected() {
        let harness = TestHarness::with_students(vec![StudentFixtures::unassigned(1)]).await;

        let result = harness.service.reconcile_student(&student(), &harness.year()).await;

        assert_err_variant!(result, LedgerError::Validation(_));
        assert!(harness.stored_ledger(&student()).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_student() {
        let harness = TestHarness::with_students(vec![]).await;

        let result = harness.service.reconcile_student(&student(), &harness.year()).await;

        assert_err_variant!(result, LedgerError::StudentNotFound(_));
    }

    #[tokio::test]
    async fn test_missing_catalog_is_a_store_error() {
        let harness = TestHarnessBuilder::new()
            .without_catalogs()
            .with_student(StudentFixtures::day_scholar(1))
            .build()
            .await;

        let error = assert_err!(harness.service.reconcile_student(&student(), &harness.year()).await);

        match error {
            LedgerError::Store(port) => assert!(port.is_not_found()),
            other => panic!("expected a store error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_student_with_no_charges_gets_a_paid_empty_ledger() {
        let student = TestStudentBuilder::new().with_class("C9").build();
        let harness = TestHarness::with_students(vec![student]).await;

        let ledger = harness
            .service
            .reconcile_student(&IdFixtures::student(1), &harness.year())
            .await
            .unwrap();

        assert!(ledger.items.is_empty());
        assert_ledger_totals(&ledger, 0, 0, LedgerStatus::Paid);
    }
}

// ============================================================================
// Payments
// ============================================================================

mod payments {
    use super::*;

    #[tokio::test]
    async fn test_payment_spills_over_in_ledger_order() {
        let harness = TestHarness::with_students(vec![StudentFixtures::bus_rider(1)]).await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let transaction = harness.service.apply_payment(payment(600_000)).await.unwrap();

        let lines: Vec<(&str, i64)> = transaction
            .allocation
            .iter()
            .map(|l| (l.item_id.as_str(), l.amount_applied.minor()))
            .collect();
        assert_eq!(lines, vec![("TERM_T1", 500_000), ("TERM_T2", 100_000)]);
        assert_allocation_balances(&transaction);

        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        assert_item(&ledger, "TERM_T1", 500_000, 500_000, ItemStatus::Paid);
        assert_item(&ledger, "TERM_T2", 300_000, 100_000, ItemStatus::Partial);
        assert_item(&ledger, "TRANSPORT_FEE", 120_000, 0, ItemStatus::Pending);
        assert_ledger_invariants(&ledger);
    }

    #[tokio::test]
    async fn test_transaction_is_journaled() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let request = payment(1_500)
            .with_reference("GW-001")
            .recorded_by(Actor::new("clerk-7", ActorRole::Accountant));
        let transaction = harness.service.apply_payment(request).await.unwrap();

        let history = harness.service.payment_history(&student(), Some(&year)).await.unwrap();
        assert_eq!(history, vec![transaction.clone()]);
        assert_eq!(transaction.recorded_by.as_deref(), Some("clerk-7"));
        assert_eq!(transaction.timestamp, harness.clock.now());
    }

    #[tokio::test]
    async fn test_replayed_reference_is_applied_once() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let first = harness
            .service
            .apply_payment(payment(1_000).with_reference("GW-42"))
            .await
            .unwrap();
        let replay = harness
            .service
            .apply_payment(payment(1_000).with_reference("GW-42"))
            .await
            .unwrap();

        assert_eq!(first.id, replay.id);
        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        assert_eq!(ledger.total_paid, Money::from_minor(1_000));
        assert_eq!(harness.service.payment_history(&student(), None).await.unwrap().len(), 1);
        assert_eq!(harness.notifier.events().await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_replays_resolve_to_one_payment() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let calls = (0..5).map(|_| {
            let service = harness.service.clone();
            async move { service.apply_payment(payment(700).with_reference("GW-7")).await }
        });
        let results = futures_join_all(calls).await;

        let ids: Vec<_> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        assert_eq!(ledger.total_paid, Money::from_minor(700));
    }

    #[tokio::test]
    async fn test_concurrent_payments_all_land() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let calls = (0..4).map(|_| {
            let service = harness.service.clone();
            async move { service.apply_payment(payment(1_000)).await }
        });
        for result in futures_join_all(calls).await {
            // Four writers on one ledger can exhaust the default retries
            if let Err(error) = result {
                assert!(matches!(error, LedgerError::Conflict(_)), "{:?}", error);
            }
        }

        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        let recorded: Money = harness
            .service
            .payment_history(&student(), Some(&year))
            .await
            .unwrap()
            .iter()
            .map(|t| t.amount)
            .sum();
        assert_eq!(ledger.total_paid, recorded);
        assert_ledger_invariants(&ledger);
    }

    #[tokio::test]
    async fn test_payment_without_ledger() {
        let harness = single_term_harness().await;

        let result = harness.service.apply_payment(payment(100)).await;

        assert_err_variant!(result, LedgerError::NotFound { .. });
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let harness = single_term_harness().await;
        harness.service.reconcile_student(&student(), &harness.year()).await.unwrap();

        assert_err_variant!(harness.service.apply_payment(payment(0)).await, LedgerError::Validation(_));
        assert_err_variant!(harness.service.apply_payment(payment(-5)).await, LedgerError::Validation(_));
    }

    #[tokio::test]
    async fn test_overpayment_reports_outstanding() {
        let harness = single_term_harness().await;
        harness.service.reconcile_student(&student(), &harness.year()).await.unwrap();

        let error = assert_err!(harness.service.apply_payment(payment(5_001)).await);

        match error {
            LedgerError::Overpayment { amount, outstanding } => {
                assert_eq!(amount, Money::from_minor(5_001));
                assert_eq!(outstanding, Money::from_minor(5_000));
            }
            other => panic!("expected Overpayment, got {:?}", other),
        }
        assert!(harness.service.payment_history(&student(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_notifies_student_and_admins() {
        let harness = single_term_harness().await;
        harness.service.reconcile_student(&student(), &harness.year()).await.unwrap();

        harness.service.apply_payment(payment(2_500)).await.unwrap();

        let events = harness.notifier.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].target_kind, NotifyTarget::Student);
        assert_eq!(events[0].target_id, student().to_string());
        assert_eq!(events[1].target_kind, NotifyTarget::Role);
        assert_eq!(events[1].target_id, "admin");
    }

    #[tokio::test]
    async fn test_failed_notification_does_not_undo_payment() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();
        harness.notifier.set_failing(true);

        assert_ok!(harness.service.apply_payment(payment(2_500)).await);

        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        assert_eq!(ledger.total_paid, Money::from_minor(2_500));
        assert!(harness.notifier.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();
        harness.store.inject_conflicts(2);

        assert_ok!(harness.service.apply_payment(payment(1_000)).await);

        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        assert_eq!(ledger.total_paid, Money::from_minor(1_000));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_conflict() {
        let harness = single_term_harness().await;
        let year = harness.year();
        let before = harness.service.reconcile_student(&student(), &year).await.unwrap();
        harness.store.inject_conflicts(10);

        let error = assert_err!(harness.service.apply_payment(payment(1_000)).await);

        assert!(matches!(error, LedgerError::Conflict(_)));
        assert!(error.is_retryable());
        assert_eq!(harness.service.get_ledger(&student(), &year).await.unwrap(), before);
        assert!(harness.notifier.events().await.is_empty());
    }
}

// ============================================================================
// Adjustments
// ============================================================================

mod adjustments {
    use super::*;

    async fn reconciled() -> TestHarness {
        let harness = TestHarness::with_students(vec![StudentFixtures::bus_rider(1)]).await;
        harness.service.reconcile_student(&student(), &harness.year()).await.unwrap();
        harness
    }

    #[tokio::test]
    async fn test_discount_and_override_in_one_batch() {
        let harness = reconciled().await;

        let record = harness
            .service
            .apply_adjustments(adjustment(
                vec![
                    ItemChange::discount("TERM_T1", Money::from_minor(50_000)),
                    ItemChange::set_amount("TRANSPORT_FEE", Money::from_minor(90_000)),
                ],
                Actor::admin("principal"),
            ))
            .await
            .unwrap();

        assert_eq!(record.changes.len(), 2);
        assert_eq!(record.changes[0].old_amount, Money::from_minor(500_000));
        assert_eq!(record.changes[0].new_amount, Money::from_minor(450_000));
        assert_eq!(record.changes[1].kind, AdjustmentKind::Override);
        assert_eq!(record.net_change(), Money::from_minor(-80_000));

        let ledger = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();
        assert_item(&ledger, "TERM_T1", 450_000, 0, ItemStatus::Pending);
        assert_item(&ledger, "TRANSPORT_FEE", 90_000, 0, ItemStatus::Pending);
        assert_ledger_totals(&ledger, 450_000 + 300_000 + 90_000, 0, LedgerStatus::Pending);

        let history = harness
            .service
            .adjustment_history(&student(), Some(&harness.year()))
            .await
            .unwrap();
        assert_eq!(history, vec![record]);
    }

    #[tokio::test]
    async fn test_discount_floors_at_zero() {
        let harness = reconciled().await;

        harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::discount("TRANSPORT_FEE", Money::from_minor(1_000_000))],
                Actor::admin("principal"),
            ))
            .await
            .unwrap();

        let ledger = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();
        assert_item(&ledger, "TRANSPORT_FEE", 0, 0, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_one_invalid_change_rejects_the_batch() {
        let harness = reconciled().await;
        harness.service.apply_payment(payment(200_000)).await.unwrap();
        let before = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();

        let result = harness
            .service
            .apply_adjustments(adjustment(
                vec![
                    ItemChange::discount("TERM_T2", Money::from_minor(10_000)),
                    ItemChange::set_amount("TERM_T1", Money::from_minor(150_000)),
                ],
                Actor::admin("principal"),
            ))
            .await;

        assert_err_variant!(result, LedgerError::InvalidAdjustment { .. });
        let after = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();
        assert_eq!(after, before);
        assert!(harness
            .service
            .adjustment_history(&student(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_items_are_skipped() {
        let harness = reconciled().await;

        let record = harness
            .service
            .apply_adjustments(adjustment(
                vec![
                    ItemChange::discount("CUSTOM_LIBRARY", Money::from_minor(10)),
                    ItemChange::discount("TERM_T2", Money::from_minor(10_000)),
                ],
                Actor::admin("principal"),
            ))
            .await
            .unwrap();

        assert_eq!(record.changes.len(), 1);
        assert_eq!(record.changes[0].item_id.as_str(), "TERM_T2");
    }

    #[tokio::test]
    async fn test_batch_naming_only_missing_items_changes_nothing() {
        let harness = reconciled().await;
        let version = harness.stored_version(&student()).await;

        let record = harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::discount("CUSTOM_LIBRARY", Money::from_minor(10))],
                Actor::new("ms-okafor", ActorRole::Teacher),
            ))
            .await
            .unwrap();

        assert!(record.changes.is_empty());
        assert_eq!(harness.stored_version(&student()).await, version);
        assert!(harness
            .service
            .adjustment_history(&student(), None)
            .await
            .unwrap()
            .is_empty());
        assert!(harness.notifier.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_override_beyond_money_range_is_rejected() {
        let harness = reconciled().await;
        let before = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();

        let result = harness
            .service
            .apply_adjustments(adjustment(
                vec![
                    ItemChange::set_amount("TERM_T1", Money::from_minor(i64::MAX)),
                    ItemChange::set_amount("TRANSPORT_FEE", Money::from_minor(i64::MAX)),
                ],
                Actor::admin("principal"),
            ))
            .await;

        assert_err_variant!(result, LedgerError::Validation(_));
        let after = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();
        assert_eq!(after, before);
        assert_ledger_invariants(&after);
        assert!(harness
            .service
            .adjustment_history(&student(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_override_can_settle_a_partially_paid_item() {
        let harness = reconciled().await;
        harness.service.apply_payment(payment(200_000)).await.unwrap();

        harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::set_amount("TERM_T1", Money::from_minor(200_000))],
                Actor::admin("principal"),
            ))
            .await
            .unwrap();

        let ledger = harness.service.get_ledger(&student(), &harness.year()).await.unwrap();
        assert_item(&ledger, "TERM_T1", 200_000, 200_000, ItemStatus::Paid);
        assert_ledger_invariants(&ledger);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let harness = reconciled().await;

        let no_changes = adjustment(vec![], Actor::admin("principal"));
        assert_err_variant!(
            harness.service.apply_adjustments(no_changes).await,
            LedgerError::Validation(_)
        );

        let mut no_reason = adjustment(
            vec![ItemChange::discount("TERM_T1", Money::from_minor(1))],
            Actor::admin("principal"),
        );
        no_reason.reason = "  ".to_string();
        assert_err_variant!(
            harness.service.apply_adjustments(no_reason).await,
            LedgerError::Validation(_)
        );

        let negative = adjustment(
            vec![ItemChange::set_amount("TERM_T1", Money::from_minor(-1))],
            Actor::admin("principal"),
        );
        assert_err_variant!(
            harness.service.apply_adjustments(negative).await,
            LedgerError::Validation(_)
        );
    }

    #[tokio::test]
    async fn test_adjustment_without_ledger() {
        let harness = TestHarness::with_students(vec![StudentFixtures::bus_rider(1)]).await;

        let result = harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::discount("TERM_T1", Money::from_minor(1))],
                Actor::admin("principal"),
            ))
            .await;

        assert_err_variant!(result, LedgerError::NotFound { .. });
    }

    #[tokio::test]
    async fn test_constrained_role_escalates_to_admins() {
        let harness = reconciled().await;

        harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::discount("TERM_T1", Money::from_minor(5_000))],
                Actor::new("ms-okafor", ActorRole::Teacher),
            ))
            .await
            .unwrap();

        let events = harness.notifier.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].target_kind, NotifyTarget::Student);
        assert_eq!(events[1].target_kind, NotifyTarget::Role);
        assert_eq!(events[1].target_id, "admin");
        assert_eq!(events[1].metadata["performed_by"], "ms-okafor");
    }

    #[tokio::test]
    async fn test_admin_adjustment_does_not_escalate() {
        let harness = reconciled().await;

        harness
            .service
            .apply_adjustments(adjustment(
                vec![ItemChange::discount("TERM_T1", Money::from_minor(5_000))],
                Actor::admin("principal"),
            ))
            .await
            .unwrap();

        let events = harness.notifier.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Fees adjusted");
    }
}

// ============================================================================
// Custom fees and maintenance
// ============================================================================

mod custom_fees {
    use super::*;

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let harness = TestHarness::with_students(vec![StudentFixtures::day_scholar(1)]).await;
        let year = harness.year();
        let fee = TestCustomFeeBuilder::new().with_amount(7_500).build();
        let student = StudentFixtures::day_scholar(1);

        assert!(harness.service.append_custom_fee(&student, &year, &fee).await.unwrap());
        assert!(!harness.service.append_custom_fee(&student, &year, &fee).await.unwrap());

        let ledger = harness.service.get_ledger(&student.id, &year).await.unwrap();
        assert_item_order(&ledger, &["CUSTOM_EXAM"]);
        assert_ledger_totals(&ledger, 7_500, 0, LedgerStatus::Pending);
    }

    #[tokio::test]
    async fn test_appended_fee_lands_before_transport() {
        let harness = TestHarness::with_students(vec![StudentFixtures::bus_rider(1)]).await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();

        let fee = CatalogFixtures::exam_fee();
        harness
            .service
            .append_custom_fee(&StudentFixtures::bus_rider(1), &year, &fee)
            .await
            .unwrap();

        let ledger = harness.service.get_ledger(&student(), &year).await.unwrap();
        assert_item_order(&ledger, &["TERM_T1", "TERM_T2", "CUSTOM_EXAM", "TRANSPORT_FEE"]);
        assert_ledger_invariants(&ledger);
    }

    #[tokio::test]
    async fn test_purge_year_removes_ledgers_and_history() {
        let harness = single_term_harness().await;
        let year = harness.year();
        harness.service.reconcile_student(&student(), &year).await.unwrap();
        harness.service.apply_payment(payment(1_000)).await.unwrap();

        assert_eq!(harness.service.purge_year(&year).await.unwrap(), 1);

        assert_err_variant!(
            harness.service.get_ledger(&student(), &year).await,
            LedgerError::NotFound { .. }
        );
        assert!(harness.service.payment_history(&student(), None).await.unwrap().is_empty());
    }
}

async fn futures_join_all<F, T>(futures: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("task panicked"));
    }
    results
}
