// ==========================================
// 调度任务集成测试
// ==========================================
// 覆盖: 倒计时阈值去重 / 到期对账按户合并 / 失败隔离 (投递失败, 坏数据) / 防重入
// ==========================================


#[cfg(test)]
mod scheduler_test {
    use super::test_helpers::*;
    use chrono::{DateTime, Duration, Utc};
    use livestock_compliance::config::CountdownPolicy;
    use livestock_compliance::domain::types::ApprovalStatus;
    use livestock_compliance::notification::{
        InMemoryDispatcher, NotificationDispatcher, NotificationPayload,
    };
    use livestock_compliance::repository::{
        AnimalRepository, CountdownNotificationRepository, TreatmentRepository,
    };
    use livestock_compliance::services::{
        SweepOutcome, WithdrawalCountdownScheduler, WithdrawalExpiryReconciler,
    };
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    struct Fixture {
        _tmp: NamedTempFile,
        conn: Arc<Mutex<Connection>>,
        animal_repo: Arc<AnimalRepository>,
        treatment_repo: Arc<TreatmentRepository>,
        countdown_repo: Arc<CountdownNotificationRepository>,
    }

    fn fixture() -> Fixture {
        let (tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path).unwrap();
        Fixture {
            _tmp: tmp,
            animal_repo: Arc::new(AnimalRepository::new(conn.clone())),
            treatment_repo: Arc::new(TreatmentRepository::new(conn.clone())),
            countdown_repo: Arc::new(CountdownNotificationRepository::new(conn.clone())),
            conn,
        }
    }

    /// 绕过仓储直接写入非法数据
    fn corrupt(fx: &Fixture, sql: &str) {
        fx.conn.lock().unwrap().execute(sql, []).unwrap();
    }

    fn countdown(fx: &Fixture, dispatcher: Arc<dyn NotificationDispatcher>) -> WithdrawalCountdownScheduler {
        WithdrawalCountdownScheduler::new(
            fx.treatment_repo.clone(),
            fx.countdown_repo.clone(),
            dispatcher,
            CountdownPolicy {
                send_delay_ms: 0,
                ..CountdownPolicy::default()
            },
        )
    }

    fn countdown_days(dispatcher: &InMemoryDispatcher) -> Vec<i64> {
        dispatcher
            .sent()
            .into_iter()
            .filter_map(|n| match n.payload {
                NotificationPayload::WithdrawalCountdown { days_remaining, .. } => Some(days_remaining),
                _ => None,
            })
            .collect()
    }

    /// 开启休药期的牲畜, 结束时间 `end`
    fn in_withdrawal(fx: &Fixture, animal_id: &str, tag_id: &str, farmer_id: &str, end: DateTime<Utc>) {
        fx.animal_repo.insert(&animal(animal_id, tag_id, farmer_id)).unwrap();
        fx.animal_repo
            .start_withdrawal(animal_id, end, end - Duration::days(7))
            .unwrap();
    }

    // ==========================================
    // 休药倒计时
    // ==========================================

    #[tokio::test]
    async fn test_countdown_same_day_rerun_sends_once() {
        let fx = fixture();
        let now = Utc::now();
        fx.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        fx.treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "penicillin",
                now - Duration::days(4),
                now + Duration::days(3),
            ))
            .unwrap();

        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let scheduler = countdown(&fx, dispatcher.clone());

        let first = scheduler.run_sweep_at(now).await.unwrap().completed().unwrap();
        assert_eq!(first.due, 1);
        assert_eq!(first.sent, 1);

        // 同一轮次重复触发
        let second = scheduler.run_sweep_at(now).await.unwrap().completed().unwrap();
        assert_eq!(second.sent, 0);
        assert_eq!(second.already_notified, 1);

        assert_eq!(countdown_days(&dispatcher), vec![3]);
        assert_eq!(dispatcher.delivered_to("F1").len(), 1);

        let records = fx.countdown_repo.find_by_treatment("T1").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].email_sent);
    }

    #[tokio::test]
    async fn test_countdown_fires_each_threshold_and_skips_others() {
        let fx = fixture();
        let now = Utc::now();
        fx.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        fx.treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "penicillin",
                now - Duration::days(1),
                now + Duration::days(7),
            ))
            .unwrap();
        let mut pending = approved_treatment(
            "T2",
            "A1",
            "F1",
            "penicillin",
            now - Duration::days(1),
            now + Duration::days(7),
        );
        pending.approval_status = ApprovalStatus::Pending;
        fx.treatment_repo.insert(&pending).unwrap();

        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let scheduler = countdown(&fx, dispatcher.clone());

        for day in 0..=7 {
            scheduler
                .run_sweep_at(now + Duration::days(day))
                .await
                .unwrap();
        }

        assert_eq!(countdown_days(&dispatcher), vec![7, 3, 1, 0]);
    }

    #[tokio::test]
    async fn test_countdown_failure_is_recorded_not_retried() {
        let fx = fixture();
        let now = Utc::now();
        fx.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        fx.treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "penicillin",
                now - Duration::days(1),
                now + Duration::days(1),
            ))
            .unwrap();

        let dispatcher = Arc::new(InMemoryDispatcher::failing_for(["F1"]));
        let scheduler = countdown(&fx, dispatcher.clone());

        let report = scheduler.run_sweep_at(now).await.unwrap().completed().unwrap();
        assert_eq!(report.failed, 1);

        let records = fx.countdown_repo.find_by_treatment("T1").unwrap();
        assert!(!records[0].email_sent);
        assert!(records[0].failure_reason.is_some());

        scheduler.run_sweep_at(now).await.unwrap();
        assert_eq!(dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_countdown_malformed_treatment_does_not_block_others() {
        let fx = fixture();
        let now = Utc::now();
        fx.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        fx.animal_repo.insert(&animal("A2", "TAG-2", "F2")).unwrap();
        fx.treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "penicillin",
                now - Duration::days(4),
                now + Duration::days(3),
            ))
            .unwrap();
        fx.treatment_repo
            .insert(&approved_treatment(
                "T2",
                "A2",
                "F2",
                "penicillin",
                now - Duration::days(4),
                now + Duration::days(1),
            ))
            .unwrap();
        corrupt(&fx, "UPDATE treatment SET linked_lab_test_ids = 'oops' WHERE treatment_id = 'T2'");

        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let scheduler = countdown(&fx, dispatcher.clone());
        let report = scheduler.run_sweep_at(now).await.unwrap().completed().unwrap();

        assert_eq!(report.treatments_scanned, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(countdown_days(&dispatcher), vec![3]);
        assert!(dispatcher.delivered_to("F2").is_empty());
    }

    // ==========================================
    // 休药期到期对账
    // ==========================================

    #[tokio::test]
    async fn test_expiry_malformed_animal_does_not_block_others() {
        let fx = fixture();
        let now = Utc::now();
        in_withdrawal(&fx, "A1", "TAG-1", "F1", now - Duration::hours(2));
        in_withdrawal(&fx, "A2", "TAG-2", "F1", now - Duration::hours(1));
        corrupt(&fx, "UPDATE animal SET updated_at = 'garbage' WHERE animal_id = 'A2'");

        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let reconciler = WithdrawalExpiryReconciler::new(fx.animal_repo.clone(), dispatcher.clone());
        let report = reconciler.run_reconciliation_at(now).await.unwrap().completed().unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.animals_failed, 1);
        assert_eq!(report.animals_updated, 1);
        assert_eq!(report.affected.get("F1"), Some(&vec!["TAG-1".to_string()]));
        assert_eq!(report.farmers_notified, 1);

        let a1 = fx.animal_repo.find_by_id("A1").unwrap().unwrap();
        assert!(!a1.withdrawal_active);
        assert!(a1.requires_mrl_test);
    }

    #[tokio::test]
    async fn test_expiry_batches_one_notification_per_farmer() {
        let fx = fixture();
        let now = Utc::now();
        in_withdrawal(&fx, "A1", "TAG-1", "F1", now - Duration::hours(3));
        in_withdrawal(&fx, "A2", "TAG-2", "F1", now - Duration::hours(1));
        in_withdrawal(&fx, "B1", "TAG-9", "F2", now - Duration::minutes(5));
        in_withdrawal(&fx, "C1", "TAG-5", "F3", now + Duration::days(2));

        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let reconciler = WithdrawalExpiryReconciler::new(fx.animal_repo.clone(), dispatcher.clone());
        let report = reconciler.run_reconciliation_at(now).await.unwrap().completed().unwrap();

        assert_eq!(report.candidates, 3);
        assert_eq!(report.animals_updated, 3);
        assert_eq!(report.farmers_notified, 2);

        let f1 = dispatcher.delivered_to("F1");
        assert_eq!(f1.len(), 1);
        match &f1[0] {
            NotificationPayload::WithdrawalExpired { tag_ids, .. } => {
                let mut tags = tag_ids.clone();
                tags.sort();
                assert_eq!(tags, vec!["TAG-1".to_string(), "TAG-2".to_string()]);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(dispatcher.delivered_to("F2").len(), 1);
        assert!(dispatcher.delivered_to("F3").is_empty());

        let a1 = fx.animal_repo.find_by_id("A1").unwrap().unwrap();
        assert!(!a1.withdrawal_active);
        assert!(a1.requires_mrl_test);
        let c1 = fx.animal_repo.find_by_id("C1").unwrap().unwrap();
        assert!(c1.withdrawal_active);
        assert!(!c1.requires_mrl_test);

        // 再次执行无候选
        let rerun = reconciler.run_reconciliation_at(now).await.unwrap().completed().unwrap();
        assert_eq!(rerun.candidates, 0);
        assert_eq!(dispatcher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_expiry_notification_failure_is_isolated() {
        let fx = fixture();
        let now = Utc::now();
        in_withdrawal(&fx, "A1", "TAG-1", "F1", now - Duration::hours(1));
        in_withdrawal(&fx, "B1", "TAG-9", "F2", now - Duration::hours(1));

        let dispatcher = Arc::new(InMemoryDispatcher::failing_for(["F1"]));
        let reconciler = WithdrawalExpiryReconciler::new(fx.animal_repo.clone(), dispatcher.clone());
        let report = reconciler.run_reconciliation_at(now).await.unwrap().completed().unwrap();

        assert_eq!(report.animals_updated, 2);
        assert_eq!(report.notifications_failed, 1);
        assert_eq!(report.farmers_notified, 1);
        assert_eq!(dispatcher.delivered_to("F2").len(), 1);
        assert!(fx.animal_repo.find_by_id("A1").unwrap().unwrap().requires_mrl_test);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let fx = fixture();
        let now = Utc::now();
        in_withdrawal(&fx, "A1", "TAG-1", "F1", now - Duration::hours(1));

        let gate = Arc::new(GateDispatcher::new());
        let reconciler = Arc::new(WithdrawalExpiryReconciler::new(
            fx.animal_repo.clone(),
            gate.clone(),
        ));

        let background = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.run_reconciliation_at(now).await })
        };
        gate.entered.notified().await;

        let overlapping = reconciler.run_reconciliation_at(now).await.unwrap();
        assert_eq!(overlapping, SweepOutcome::Skipped);

        gate.release.notify_one();
        let first = background.await.unwrap().unwrap().completed().unwrap();
        assert_eq!(first.farmers_notified, 1);

        // 上一轮结束后可再次执行
        assert!(!reconciler.run_reconciliation_at(now).await.unwrap().is_skipped());
    }
}
