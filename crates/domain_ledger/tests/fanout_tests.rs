//! Population-wide sync and custom fee assignment

use std::time::Duration;
use tokio::sync::watch;

use domain_ledger::{ChargeItemId, EngineConfig, FanOutCoordinator, LedgerError, LedgerStatus};
use test_utils::{
    assert_err_variant, assert_item_order, assert_ledger_invariants, assert_ledger_totals,
    IdFixtures, StudentFixtures, TestCustomFeeBuilder, TestHarness, TestHarnessBuilder,
    TestStudentBuilder,
};

/// `count` day scholars, read in pages of 4, two at a time
async fn population_harness(count: usize) -> TestHarness {
    TestHarnessBuilder::new()
        .with_students(StudentFixtures::population(count))
        .with_config(EngineConfig::new().batch_size(4).max_concurrency(2))
        .build()
        .await
}

mod sync_population {
    use super::*;

    #[tokio::test]
    async fn test_every_active_student_is_reconciled() {
        let harness = population_harness(11).await;

        let report = harness.service.sync_population(&harness.year()).await.unwrap();

        assert_eq!(report.updated_count, 11);
        assert_eq!(report.unchanged_count, 0);
        assert!(report.failures.is_empty());
        assert!(!report.interrupted);
        assert_eq!(harness.store.inner().ledger_count().await, 11);
        for ledger in harness.store.inner().ledgers().await {
            assert_ledger_invariants(&ledger);
            assert_item_order(&ledger, &["TERM_T1", "TERM_T2"]);
        }
    }

    #[tokio::test]
    async fn test_rerun_changes_nothing() {
        let harness = population_harness(6).await;
        harness.service.sync_population(&harness.year()).await.unwrap();

        let report = harness.service.sync_population(&harness.year()).await.unwrap();

        assert_eq!(report.updated_count, 0);
        assert_eq!(report.unchanged_count, 6);
        assert_eq!(harness.stored_version(&IdFixtures::student(1)).await, Some(1));
    }

    #[tokio::test]
    async fn test_inactive_students_are_left_alone() {
        let harness = TestHarnessBuilder::new()
            .with_students(StudentFixtures::population(3))
            .with_student(TestStudentBuilder::new().with_id("STU-0099").inactive().build())
            .build()
            .await;

        let report = harness.service.sync_population(&harness.year()).await.unwrap();

        assert_eq!(report.updated_count, 3);
        assert!(harness.stored_ledger(&"STU-0099".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_one_failing_student_does_not_stop_the_run() {
        let harness = population_harness(8).await;
        harness.store.fail_commits_for(IdFixtures::student(3)).await;
        harness
            .reference
            .upsert_student(StudentFixtures::unassigned(5))
            .await;

        let report = harness.service.sync_population(&harness.year()).await.unwrap();

        assert_eq!(report.updated_count, 6);
        let mut failed: Vec<&str> = report.failures.iter().map(|f| f.student_id.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["STU-0003", "STU-0005"]);

        harness.store.heal(&IdFixtures::student(3)).await;
        let rerun = harness.service.sync_population(&harness.year()).await.unwrap();
        assert_eq!(rerun.updated_count, 1);
        assert_eq!(rerun.unchanged_count, 6);
        assert_eq!(rerun.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_catalog_fails_the_whole_run() {
        let harness = population_harness(2).await;

        let result = harness.service.sync_population(&IdFixtures::next_year()).await;

        assert_err_variant!(result, LedgerError::Store(_));
        assert_eq!(harness.store.inner().ledger_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nobody() {
        let harness = population_harness(5).await;
        let (_tx, rx) = watch::channel(true);

        let report = FanOutCoordinator::new(harness.service.clone())
            .with_cancellation(rx)
            .sync_population(&harness.year())
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.updated_count, 0);
        assert_eq!(harness.store.inner().ledger_count().await, 0);
    }

    #[tokio::test]
    async fn test_open_cancel_channel_does_not_interrupt() {
        let harness = population_harness(5).await;
        let (_tx, rx) = watch::channel(false);

        let report = FanOutCoordinator::new(harness.service.clone())
            .with_cancellation(rx)
            .sync_population(&harness.year())
            .await
            .unwrap();

        assert!(!report.interrupted);
        assert_eq!(report.updated_count, 5);
    }

    #[tokio::test]
    async fn test_expired_deadline_interrupts() {
        let harness = TestHarnessBuilder::new()
            .with_students(StudentFixtures::population(5))
            .with_config(EngineConfig::new().deadline(Duration::ZERO))
            .build()
            .await;

        let report = harness.service.sync_population(&harness.year()).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.updated_count + report.unchanged_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let harness = TestHarnessBuilder::new()
            .with_students(StudentFixtures::population(1))
            .with_config(EngineConfig::new().max_concurrency(0))
            .build()
            .await;

        let result = harness.service.sync_population(&harness.year()).await;

        assert_err_variant!(result, LedgerError::Validation(_));
    }
}

mod assign_custom_fee {
    use super::*;

    fn occurrences(ledger: &domain_ledger::LedgerAccount, id: &ChargeItemId) -> usize {
        ledger.items.iter().filter(|item| &item.id == id).count()
    }

    #[tokio::test]
    async fn test_only_targeted_students_receive_the_fee() {
        let harness = TestHarnessBuilder::new()
            .with_students(StudentFixtures::population(3))
            .with_student(StudentFixtures::class_c2(4))
            .build()
            .await;
        let fee = TestCustomFeeBuilder::new().for_classes(&["C1"]).build();

        let report = harness.service.assign_custom_fee(&fee, &harness.year()).await.unwrap();

        assert_eq!(report.fee_id, fee.id);
        assert_eq!(report.affected_count, 3);
        assert_eq!(report.skipped_count, 0);
        assert!(harness.stored_ledger(&IdFixtures::student(4)).await.is_none());

        // Students without a ledger get one holding only the fee
        let ledger = harness.stored_ledger(&IdFixtures::student(1)).await.unwrap();
        assert_item_order(&ledger, &["CUSTOM_EXAM"]);
        assert_ledger_totals(&ledger, 25_000, 0, LedgerStatus::Pending);
    }

    #[tokio::test]
    async fn test_village_and_student_targets() {
        let harness = TestHarnessBuilder::new()
            .with_students(StudentFixtures::population(2))
            .with_student(StudentFixtures::class_c2(3))
            .build()
            .await;

        let by_village = TestCustomFeeBuilder::new()
            .with_id("BUS_PASS")
            .for_villages(&["V2"])
            .build();
        let report = harness.service.assign_custom_fee(&by_village, &harness.year()).await.unwrap();
        assert_eq!(report.affected_count, 1);

        let by_student = TestCustomFeeBuilder::new()
            .with_id("TRIP")
            .for_students(&[IdFixtures::student(2), IdFixtures::student(77)])
            .build();
        let report = harness.service.assign_custom_fee(&by_student, &harness.year()).await.unwrap();
        assert_eq!(report.affected_count, 1);
        let ledger = harness.stored_ledger(&IdFixtures::student(2)).await.unwrap();
        assert_item_order(&ledger, &["CUSTOM_TRIP"]);
    }

    #[tokio::test]
    async fn test_rerun_after_partial_failure_never_double_adds() {
        let harness = population_harness(6).await;
        harness.service.sync_population(&harness.year()).await.unwrap();
        let fee = TestCustomFeeBuilder::new().build();
        harness.store.fail_commits_for(IdFixtures::student(2)).await;
        harness.store.fail_commits_for(IdFixtures::student(5)).await;

        let first = harness.service.assign_custom_fee(&fee, &harness.year()).await.unwrap();
        assert_eq!(first.affected_count, 4);
        assert_eq!(first.failures.len(), 2);

        harness.store.heal(&IdFixtures::student(2)).await;
        harness.store.heal(&IdFixtures::student(5)).await;
        let second = harness.service.assign_custom_fee(&fee, &harness.year()).await.unwrap();
        assert_eq!(second.affected_count, 2);
        assert_eq!(second.skipped_count, 4);
        assert!(second.failures.is_empty());

        let item_id = fee.item_id();
        for ledger in harness.store.inner().ledgers().await {
            assert_eq!(occurrences(&ledger, &item_id), 1, "ledger {}", ledger.key());
            assert_item_order(&ledger, &["TERM_T1", "TERM_T2", "CUSTOM_EXAM"]);
            assert_ledger_invariants(&ledger);
        }
    }

    #[tokio::test]
    async fn test_inactive_fee_is_rejected() {
        let harness = population_harness(2).await;
        let fee = TestCustomFeeBuilder::new().inactive().build();

        let result = harness.service.assign_custom_fee(&fee, &harness.year()).await;

        assert_err_variant!(result, LedgerError::Validation(_));
        assert_eq!(harness.store.inner().ledger_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_target_is_rejected() {
        let harness = population_harness(2).await;
        let fee = TestCustomFeeBuilder::new().for_classes(&[]).build();

        let result = harness.service.assign_custom_fee(&fee, &harness.year()).await;

        assert_err_variant!(result, LedgerError::Validation(_));
    }

    #[tokio::test]
    async fn test_cancelled_assignment_reports_interruption() {
        let harness = population_harness(3).await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = FanOutCoordinator::new(harness.service.clone())
            .with_cancellation(rx)
            .assign_custom_fee(&TestCustomFeeBuilder::new().build(), &harness.year())
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.affected_count, 0);
    }
}
