// ==========================================
// 合规状态查询集成测试
// ==========================================
// 覆盖: 休药期覆盖规则 / 待检 / 超标 / 销售拦截 / 并发一致性
// ==========================================


#[cfg(test)]
mod compliance_status_test {
    use super::test_helpers::*;
    use chrono::{Duration, Utc};
    use livestock_compliance::api::ApiError;
    use livestock_compliance::domain::types::{AlertType, ComplianceStatus, RiskLevel, Severity};
    use livestock_compliance::notification::InMemoryDispatcher;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_no_history_is_safe() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();

        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert!(report.can_sell_products);
        assert_eq!(report.counts.treatments_in_window, 0);
        assert_eq!(report.counts.lab_tests_in_window, 0);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_active_withdrawal_overrides_passed_test() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();

        state
            .intake
            .register_treatment(pending_treatment("T1", "A1", "F1", 5))
            .unwrap();
        state.intake.approve_treatment("T1", "vet-1").unwrap();

        // 其他药物的合格检测不影响休药期判定
        state
            .intake
            .record_lab_test(lab_test("LT1", "A1", "F1", "penicillin", 1.0, 100.0, Utc::now()))
            .await
            .unwrap();

        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::WithdrawalActive);
        assert!(!report.can_sell_products);
        assert_eq!(report.details.active_withdrawal_treatments, vec!["T1".to_string()]);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_treatment_does_not_block_sale() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        state
            .intake
            .register_treatment(pending_treatment("T1", "A1", "F1", 5))
            .unwrap();

        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::Safe);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_ended_withdrawal_requires_test_until_linked() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        let now = Utc::now();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        state
            .treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "oxytetracycline",
                now - Duration::days(20),
                now - Duration::days(1),
            ))
            .unwrap();

        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::TestRequired);
        assert!(!report.can_sell_products);
        assert_eq!(report.details.treatments_needing_test, vec!["T1".to_string()]);

        let outcome = state
            .intake
            .record_lab_test(lab_test("LT1", "A1", "F1", "oxytetracycline", 20.0, 100.0, now))
            .await
            .unwrap();
        assert_eq!(outcome.linked_treatment_id.as_deref(), Some("T1"));

        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert!(report.can_sell_products);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_latest_test_decides_between_violation_and_safe() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        let now = Utc::now();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();

        state
            .intake
            .record_lab_test(lab_test(
                "LT1",
                "A1",
                "F1",
                "penicillin",
                180.0,
                100.0,
                now - Duration::days(2),
            ))
            .await
            .unwrap();
        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::Violation);
        assert!(!report.can_sell_products);

        state
            .intake
            .record_lab_test(lab_test(
                "LT2",
                "A1",
                "F1",
                "penicillin",
                40.0,
                100.0,
                now - Duration::days(1),
            ))
            .await
            .unwrap();
        let report = state.compliance_api.get_compliance_status("A1", "F1").unwrap();
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert_eq!(report.details.latest_lab_test_id.as_deref(), Some("LT2"));

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_animal_is_not_found() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();

        assert!(matches!(
            state.compliance_api.get_compliance_status("A1", "F2"),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            state.compliance_api.get_compliance_status("A9", "F1"),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            state.compliance_api.get_compliance_status("", "F1"),
            Err(ApiError::ValidationError(_))
        ));

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_queries_are_identical() {
        let (_tmp, state) = create_test_state(Arc::new(InMemoryDispatcher::new())).unwrap();
        let now = Utc::now();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        state
            .treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "penicillin",
                now - Duration::days(3),
                now + Duration::days(2),
            ))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let api = state.compliance_api.clone();
                std::thread::spawn(move || api.get_compliance_status_at("A1", "F1", now))
            })
            .collect();
        let reports: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        for report in &reports[1..] {
            assert_eq!(report, &reports[0]);
        }

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_blocked_sale_severity_follows_status() {
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let (_tmp, state) = create_test_state(dispatcher.clone()).unwrap();
        let now = Utc::now();
        state.animal_repo.insert(&animal("A1", "TAG-1", "F1")).unwrap();
        state.animal_repo.insert(&animal("A2", "TAG-2", "F1")).unwrap();
        state.animal_repo.insert(&animal("A3", "TAG-3", "F1")).unwrap();

        // A1 休药中
        state
            .treatment_repo
            .insert(&approved_treatment(
                "T1",
                "A1",
                "F1",
                "penicillin",
                now - Duration::days(1),
                now + Duration::days(4),
            ))
            .unwrap();
        // A2 休药结束待检
        state
            .treatment_repo
            .insert(&approved_treatment(
                "T2",
                "A2",
                "F1",
                "penicillin",
                now - Duration::days(10),
                now - Duration::days(1),
            ))
            .unwrap();

        let blocked = state.compliance_api.attempt_sale("A1", "F1", "farmer-app").await.unwrap();
        assert!(!blocked.allowed);
        let alert = blocked.alert.expect("blocked sale alert");
        assert_eq!(alert.alert_type, AlertType::BlockedSaleAttempt);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.risk_level, RiskLevel::HighPriority);
        assert_eq!(alert.animal_id.as_deref(), Some("A1"));

        let untested = state.compliance_api.attempt_sale("A2", "F1", "farmer-app").await.unwrap();
        let alert = untested.alert.expect("blocked sale alert");
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.risk_level, RiskLevel::Monitor);

        let allowed = state.compliance_api.attempt_sale("A3", "F1", "farmer-app").await.unwrap();
        assert!(allowed.allowed);
        assert!(allowed.alert.is_none());

        // 每条拦截预警都通知监管
        assert_eq!(dispatcher.delivered_to("regulator-desk").len(), 2);

        state.shutdown().await;
    }
}
