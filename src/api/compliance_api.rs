// ==========================================
// 畜产品合规引擎 - 合规状态查询 API
// ==========================================
// 职责: 按需计算销售资格 (不落库), 拦截违规销售
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::alert::{NewAlert, RegulatorAlert};
use crate::domain::types::{AlertType, ComplianceStatus, RiskLevel, Severity};
use crate::engine::compliance_status::{ComplianceQuery, ComplianceReport, ComplianceStatusResolver};
use crate::repository::animal_repo::AnimalRepository;
use crate::repository::lab_test_repo::LabTestRepository;
use crate::repository::treatment_repo::TreatmentRepository;
use crate::services::alert_lifecycle::AlertLifecycleManager;

/// 销售尝试结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleAttemptResult {
    pub allowed: bool,
    pub report: ComplianceReport,
    pub alert: Option<RegulatorAlert>, // 被拦截时生成的 BLOCKED_SALE_ATTEMPT
}

// ==========================================
// ComplianceApi
// ==========================================
pub struct ComplianceApi {
    animal_repo: Arc<AnimalRepository>,
    treatment_repo: Arc<TreatmentRepository>,
    lab_test_repo: Arc<LabTestRepository>,
    alerts: AlertLifecycleManager,
    resolver: ComplianceStatusResolver,
    lookback_days: i64,
}

impl ComplianceApi {
    pub fn new(
        animal_repo: Arc<AnimalRepository>,
        treatment_repo: Arc<TreatmentRepository>,
        lab_test_repo: Arc<LabTestRepository>,
        alerts: AlertLifecycleManager,
        lookback_days: i64,
    ) -> Self {
        Self {
            animal_repo,
            treatment_repo,
            lab_test_repo,
            alerts,
            resolver: ComplianceStatusResolver::new(),
            lookback_days,
        }
    }

    /// 查询牲畜当前合规状态
    ///
    /// # 返回
    /// - Err(ApiError::NotFound): 牲畜不存在或不属于该养殖户
    pub fn get_compliance_status(&self, animal_id: &str, farmer_id: &str) -> ApiResult<ComplianceReport> {
        self.get_compliance_status_at(animal_id, farmer_id, Utc::now())
    }

    pub fn get_compliance_status_at(
        &self,
        animal_id: &str,
        farmer_id: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<ComplianceReport> {
        if animal_id.trim().is_empty() {
            return Err(ApiError::ValidationError("animal_id 不能为空".to_string()));
        }
        if farmer_id.trim().is_empty() {
            return Err(ApiError::ValidationError("farmer_id 不能为空".to_string()));
        }

        match self.animal_repo.find_by_id(animal_id)? {
            Some(animal) if animal.farmer_id == farmer_id => {}
            _ => {
                return Err(ApiError::NotFound(format!(
                    "Animal(id={}, farmer_id={})不存在",
                    animal_id, farmer_id
                )))
            }
        }

        let treatments = self.treatment_repo.find_by_animal(animal_id)?;
        let lab_tests = self.lab_test_repo.find_by_animal(animal_id)?;
        let query = ComplianceQuery::new(animal_id, farmer_id, at).with_lookback_days(self.lookback_days);

        self.resolver
            .resolve(&query, &treatments, &lab_tests)
            .map_err(|e| ApiError::ValidationError(e.to_string()))
    }

    /// 销售尝试: 不可销售时生成 BLOCKED_SALE_ATTEMPT 预警
    pub async fn attempt_sale(
        &self,
        animal_id: &str,
        farmer_id: &str,
        actor_id: &str,
    ) -> ApiResult<SaleAttemptResult> {
        if actor_id.trim().is_empty() {
            return Err(ApiError::ValidationError("actor_id 不能为空".to_string()));
        }
        let report = self.get_compliance_status(animal_id, farmer_id)?;
        if report.can_sell_products {
            return Ok(SaleAttemptResult {
                allowed: true,
                report,
                alert: None,
            });
        }

        let (severity, risk_level) = match report.status {
            ComplianceStatus::TestRequired => (Severity::Medium, RiskLevel::Monitor),
            _ => (Severity::High, RiskLevel::HighPriority),
        };
        let new_alert = NewAlert::new(
            AlertType::BlockedSaleAttempt,
            severity,
            farmer_id,
            json!({
                "animal_id": animal_id,
                "compliance_status": report.status.as_str(),
                "explanation": report.explanation,
                "attempted_by": actor_id,
            }),
            format!("牲畜 {} 销售被拦截: {}", animal_id, report.explanation),
            risk_level,
        )
        .with_animal(animal_id);

        let alert = self.alerts.create(new_alert).await?;
        tracing::warn!(
            animal_id = animal_id,
            farmer_id = farmer_id,
            status = %report.status,
            alert_id = %alert.alert_id,
            "违规销售尝试已拦截"
        );

        Ok(SaleAttemptResult {
            allowed: false,
            report,
            alert: Some(alert),
        })
    }
}
