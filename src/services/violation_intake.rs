// ==========================================
// 畜产品合规引擎 - 用药/检测记录接入
// ==========================================
// 流程: 检测结果入库 -> 关联用药 -> (超标) 分级 -> MRL_VIOLATION 预警
// 红线: 校验失败在任何写入之前返回
// ==========================================

use crate::domain::alert::{NewAlert, RegulatorAlert};
use crate::domain::animal::Animal;
use crate::domain::lab_test::LabTestResult;
use crate::domain::treatment::Treatment;
use crate::domain::types::{AlertType, ApprovalStatus};
use crate::engine::violation_classifier::{ViolationClassification, ViolationClassifier};
use crate::repository::animal_repo::AnimalRepository;
use crate::repository::lab_test_repo::LabTestRepository;
use crate::repository::treatment_repo::TreatmentRepository;
use crate::services::alert_lifecycle::AlertLifecycleManager;
use crate::services::error::{require_id, ServiceError, ServiceResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// 检测结果接入结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTestIntakeOutcome {
    pub lab_test: LabTestResult,
    pub linked_treatment_id: Option<String>,
    pub classification: Option<ViolationClassification>,
    pub alert: Option<RegulatorAlert>,
}

pub struct ViolationIntakeService {
    animal_repo: Arc<AnimalRepository>,
    treatment_repo: Arc<TreatmentRepository>,
    lab_test_repo: Arc<LabTestRepository>,
    alerts: AlertLifecycleManager,
    classifier: ViolationClassifier,
}

impl ViolationIntakeService {
    pub fn new(
        animal_repo: Arc<AnimalRepository>,
        treatment_repo: Arc<TreatmentRepository>,
        lab_test_repo: Arc<LabTestRepository>,
        alerts: AlertLifecycleManager,
        classifier: ViolationClassifier,
    ) -> Self {
        Self {
            animal_repo,
            treatment_repo,
            lab_test_repo,
            alerts,
            classifier,
        }
    }

    // ==========================================
    // 检测结果
    // ==========================================

    /// 记录检测结果
    ///
    /// - 关联该牲畜同药物最近一条已批准用药, 回写 mrl_compliant
    /// - 合格且牲畜待检: 清除 requires_mrl_test
    /// - 不合格: 分级并创建 MRL_VIOLATION 预警 (随后异步触发模式检测)
    pub async fn record_lab_test(&self, result: LabTestResult) -> ServiceResult<LabTestIntakeOutcome> {
        require_id("lab_test_id", &result.lab_test_id)?;
        require_id("drug_name", &result.drug_name)?;
        if !result.residue_level.is_finite() || result.residue_level < 0.0 {
            return Err(ServiceError::Validation(format!(
                "residue_level 非法: {}",
                result.residue_level
            )));
        }
        let animal = self.owned_animal(&result.animal_id, &result.farmer_id)?;

        // 分级前置, 非法限量在写入前拒绝
        let classification = if result.passed {
            if !result.mrl_threshold.is_finite() || result.mrl_threshold <= 0.0 {
                return Err(ServiceError::Validation(format!(
                    "mrl_threshold 必须为正数: {}",
                    result.mrl_threshold
                )));
            }
            None
        } else {
            Some(
                self.classifier
                    .classify(result.residue_level, result.mrl_threshold)
                    .map_err(|e| ServiceError::Validation(e.to_string()))?,
            )
        };

        self.lab_test_repo.insert(&result)?;

        let linked_treatment_id = match self
            .treatment_repo
            .find_latest_approved_for_drug(&result.animal_id, &result.drug_name)?
        {
            Some(treatment) => {
                self.treatment_repo.link_lab_test(
                    &treatment.treatment_id,
                    &result.lab_test_id,
                    result.passed,
                )?;
                Some(treatment.treatment_id)
            }
            None => None,
        };

        if result.passed && animal.requires_mrl_test {
            self.animal_repo.clear_requires_mrl_test(&animal.animal_id, Utc::now())?;
        }

        let alert = match &classification {
            Some(c) => Some(self.raise_violation(&result, c).await?),
            None => None,
        };

        tracing::info!(
            lab_test_id = %result.lab_test_id,
            animal_id = %result.animal_id,
            passed = result.passed,
            linked_treatment = linked_treatment_id.as_deref().unwrap_or("-"),
            "检测结果已记录"
        );

        Ok(LabTestIntakeOutcome {
            lab_test: result,
            linked_treatment_id,
            classification,
            alert,
        })
    }

    async fn raise_violation(
        &self,
        result: &LabTestResult,
        c: &ViolationClassification,
    ) -> ServiceResult<RegulatorAlert> {
        let details = json!({
            "lab_test_id": result.lab_test_id,
            "animal_id": result.animal_id,
            "drug_name": result.drug_name,
            "residue_level_detected": c.residue_level_detected,
            "mrl_threshold": c.mrl_threshold,
            "unit": result.unit,
            "exceeded_by": c.exceeded_by,
            "percentage_over": c.percentage_over,
        });
        let message = format!(
            "{} 残留超标: 检出 {} {}, 限量 {} {} (超出 {:.2}%)",
            result.drug_name,
            c.residue_level_detected,
            result.unit,
            c.mrl_threshold,
            result.unit,
            c.percentage_over
        );

        let new_alert = NewAlert::new(
            AlertType::MrlViolation,
            c.severity,
            &result.farmer_id,
            details,
            message,
            c.risk_level,
        )
        .with_animal(&result.animal_id)
        .with_lab_test(&result.lab_test_id);

        self.alerts.create(new_alert).await
    }

    // ==========================================
    // 用药记录
    // ==========================================

    /// 养殖户登记用药 (状态固定为 PENDING)
    pub fn register_treatment(&self, mut treatment: Treatment) -> ServiceResult<Treatment> {
        require_id("treatment_id", &treatment.treatment_id)?;
        require_id("drug_name", &treatment.drug_name)?;
        self.owned_animal(&treatment.animal_id, &treatment.farmer_id)?;

        treatment.approval_status = ApprovalStatus::Pending;
        treatment.approved_by = None;
        self.treatment_repo.insert(&treatment)?;
        Ok(treatment)
    }

    /// 兽医批准用药: 开启牲畜休药期
    pub fn approve_treatment(&self, treatment_id: &str, vet_id: &str) -> ServiceResult<Treatment> {
        let treatment = self.decide(treatment_id, vet_id, ApprovalStatus::Approved)?;
        let animal = self.animal_repo.start_withdrawal(
            &treatment.animal_id,
            treatment.withdrawal_end_date,
            Utc::now(),
        )?;
        tracing::info!(
            treatment_id = treatment_id,
            animal_id = %animal.animal_id,
            withdrawal_end_date = ?animal.withdrawal_end_date,
            "用药已批准, 休药期开启"
        );
        Ok(treatment)
    }

    pub fn reject_treatment(&self, treatment_id: &str, vet_id: &str) -> ServiceResult<Treatment> {
        let treatment = self.decide(treatment_id, vet_id, ApprovalStatus::Rejected)?;
        tracing::info!(treatment_id = treatment_id, vet_id = vet_id, "用药已驳回");
        Ok(treatment)
    }

    fn decide(
        &self,
        treatment_id: &str,
        vet_id: &str,
        status: ApprovalStatus,
    ) -> ServiceResult<Treatment> {
        require_id("treatment_id", treatment_id)?;
        require_id("vet_id", vet_id)?;
        let treatment = self
            .treatment_repo
            .find_by_id(treatment_id)?
            .ok_or_else(|| ServiceError::not_found("Treatment", treatment_id))?;

        if !self.treatment_repo.update_approval(treatment_id, status, vet_id)? {
            return Err(ServiceError::Validation(format!(
                "用药记录 {} 当前状态为 {}, 不可审批",
                treatment_id, treatment.approval_status
            )));
        }
        Ok(Treatment {
            approval_status: status,
            approved_by: Some(vet_id.to_string()),
            ..treatment
        })
    }

    fn owned_animal(&self, animal_id: &str, farmer_id: &str) -> ServiceResult<Animal> {
        require_id("animal_id", animal_id)?;
        require_id("farmer_id", farmer_id)?;
        match self.animal_repo.find_by_id(animal_id)? {
            Some(animal) if animal.farmer_id == farmer_id => Ok(animal),
            _ => Err(ServiceError::not_found("Animal", animal_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::types::{ReviewStatus, Severity};
    use crate::notification::NoOpDispatcher;
    use crate::repository::alert_repo::RegulatorAlertRepository;
    use chrono::{DateTime, Duration};
    use std::sync::Mutex;

    struct Fixture {
        service: ViolationIntakeService,
        animal_repo: Arc<AnimalRepository>,
        treatment_repo: Arc<TreatmentRepository>,
        alert_repo: Arc<RegulatorAlertRepository>,
    }

    fn fixture() -> Fixture {
        let conn = Arc::new(Mutex::new(open_in_memory().expect("open db")));
        let animal_repo = Arc::new(AnimalRepository::new(conn.clone()));
        let treatment_repo = Arc::new(TreatmentRepository::new(conn.clone()));
        let lab_test_repo = Arc::new(LabTestRepository::new(conn.clone()));
        let alert_repo = Arc::new(RegulatorAlertRepository::new(conn));
        let alerts = AlertLifecycleManager::new(
            alert_repo.clone(),
            lab_test_repo.clone(),
            Arc::new(NoOpDispatcher),
            "regulator-desk",
        );
        animal_repo
            .insert(&Animal::new("A1", "TAG-1", "F1", "cattle"))
            .expect("insert animal");
        Fixture {
            service: ViolationIntakeService::new(
                animal_repo.clone(),
                treatment_repo.clone(),
                lab_test_repo,
                alerts,
                ViolationClassifier::default(),
            ),
            animal_repo,
            treatment_repo,
            alert_repo,
        }
    }

    fn treatment(id: &str, end: DateTime<Utc>) -> Treatment {
        Treatment {
            treatment_id: id.to_string(),
            animal_id: "A1".to_string(),
            farmer_id: "F1".to_string(),
            drug_name: "penicillin".to_string(),
            start_date: end - Duration::days(10),
            withdrawal_end_date: end,
            approval_status: ApprovalStatus::Approved,
            approved_by: None,
            mrl_compliant: None,
            requires_mrl_test: true,
            linked_lab_test_ids: Vec::new(),
            created_at: end - Duration::days(10),
        }
    }

    fn lab_test(id: &str, residue: f64, threshold: f64) -> LabTestResult {
        LabTestResult {
            lab_test_id: id.to_string(),
            animal_id: "A1".to_string(),
            farmer_id: "F1".to_string(),
            drug_name: "penicillin".to_string(),
            residue_level: residue,
            mrl_threshold: threshold,
            unit: "ug/kg".to_string(),
            test_date: Utc::now(),
            passed: residue <= threshold,
            review_status: ReviewStatus::PendingVerification,
            violation_resolved: false,
        }
    }

    #[test]
    fn test_register_forces_pending_and_approve_opens_withdrawal() {
        let fx = fixture();
        let end = Utc::now() + Duration::days(5);
        let registered = fx.service.register_treatment(treatment("T1", end)).unwrap();
        assert_eq!(registered.approval_status, ApprovalStatus::Pending);

        let approved = fx.service.approve_treatment("T1", "vet-1").unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("vet-1"));

        let animal = fx.animal_repo.find_by_id("A1").unwrap().unwrap();
        assert!(animal.withdrawal_active);
        assert_eq!(animal.withdrawal_end_date, Some(end));

        // 已批准不可再次审批
        assert!(matches!(
            fx.service.reject_treatment("T1", "vet-2"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_reject_leaves_animal_untouched() {
        let fx = fixture();
        fx.service
            .register_treatment(treatment("T1", Utc::now() + Duration::days(5)))
            .unwrap();
        fx.service.reject_treatment("T1", "vet-1").unwrap();
        assert!(!fx.animal_repo.find_by_id("A1").unwrap().unwrap().withdrawal_active);
    }

    #[test]
    fn test_register_for_other_farmers_animal_is_not_found() {
        let fx = fixture();
        let mut t = treatment("T1", Utc::now());
        t.farmer_id = "F2".to_string();
        assert!(matches!(
            fx.service.register_treatment(t),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_test_creates_classified_alert_and_links_treatment() {
        let fx = fixture();
        fx.treatment_repo
            .insert(&treatment("T1", Utc::now() - Duration::days(1)))
            .unwrap();

        let outcome = fx.service.record_lab_test(lab_test("LT1", 250.0, 100.0)).await.unwrap();
        assert_eq!(outcome.linked_treatment_id.as_deref(), Some("T1"));

        let alert = outcome.alert.expect("alert");
        assert_eq!(alert.alert_type, AlertType::MrlViolation);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.lab_test_id.as_deref(), Some("LT1"));
        assert_eq!(alert.violation_details["percentage_over"], json!(150.0));
        assert_eq!(fx.alert_repo.find_by_id(&alert.alert_id).unwrap().unwrap().farmer_id, "F1");

        let linked = fx.treatment_repo.find_by_id("T1").unwrap().unwrap();
        assert_eq!(linked.linked_lab_test_ids, vec!["LT1".to_string()]);
        assert_eq!(linked.mrl_compliant, Some(false));
    }

    #[tokio::test]
    async fn test_passed_test_clears_requires_mrl_test() {
        let fx = fixture();
        let now = Utc::now();
        fx.treatment_repo.insert(&treatment("T1", now - Duration::hours(1))).unwrap();
        fx.animal_repo.start_withdrawal("A1", now - Duration::hours(1), now).unwrap();
        fx.animal_repo.mark_withdrawal_expired("A1", now).unwrap();
        assert!(fx.animal_repo.find_by_id("A1").unwrap().unwrap().requires_mrl_test);

        let outcome = fx.service.record_lab_test(lab_test("LT1", 10.0, 100.0)).await.unwrap();
        assert!(outcome.alert.is_none());
        assert!(!fx.animal_repo.find_by_id("A1").unwrap().unwrap().requires_mrl_test);
    }

    #[tokio::test]
    async fn test_non_positive_threshold_rejected_before_insert() {
        let fx = fixture();
        let mut passing = lab_test("LT1", 10.0, 0.0);
        passing.passed = true;
        let err = fx.service.record_lab_test(passing).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut failing = lab_test("LT2", 10.0, 0.0);
        failing.passed = false;
        assert!(fx.service.record_lab_test(failing).await.is_err());
        assert!(fx.alert_repo.count_grouped(None).unwrap().is_empty());
    }
}
