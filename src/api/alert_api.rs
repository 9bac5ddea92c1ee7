// ==========================================
// 畜产品合规引擎 - 监管预警管理 API
// ==========================================
// 职责: 列表/详情/处理/升级/养殖户违规档案
// 所有修改委托 AlertLifecycleManager
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::alert::{AlertFilter, Page, RegulatorAlert};
use crate::domain::lab_test::LabTestResult;
use crate::domain::types::{AlertStatus, AlertType};
use crate::repository::alert_repo::AlertStats;
use crate::repository::lab_test_repo::LabTestRepository;
use crate::services::alert_lifecycle::AlertLifecycleManager;

/// 详情页关联预警条数
const RELATED_ALERT_LIMIT: u32 = 10;
/// 档案页最近记录条数
const RECENT_LIMIT: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDetail {
    pub alert: RegulatorAlert,
    pub related_alerts: Vec<RegulatorAlert>, // 同一养殖户的其他预警
}

/// 养殖户违规档案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmViolationHistory {
    pub farmer_id: String,
    pub window_days: i64,
    pub window_start: DateTime<Utc>,
    pub stats: AlertStats, // 全量 (不限窗口)
    pub mrl_violations_in_window: u64,
    pub blocked_sales_in_window: u64,
    pub lab_tests_in_window: u64,
    pub failed_lab_tests_in_window: u64,
    pub recent_alerts: Vec<RegulatorAlert>,
    pub recent_lab_tests: Vec<LabTestResult>,
}

// ==========================================
// AlertApi
// ==========================================
pub struct AlertApi {
    alerts: AlertLifecycleManager,
    lab_test_repo: Arc<LabTestRepository>,
    window_days: i64,
}

impl AlertApi {
    pub fn new(
        alerts: AlertLifecycleManager,
        lab_test_repo: Arc<LabTestRepository>,
        window_days: i64,
    ) -> Self {
        Self {
            alerts,
            lab_test_repo,
            window_days,
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn list_alerts(&self, filter: &AlertFilter) -> ApiResult<Page<RegulatorAlert>> {
        Ok(self.alerts.alert_repo().list(filter)?)
    }

    pub fn get_alert_detail(&self, alert_id: &str) -> ApiResult<AlertDetail> {
        if alert_id.trim().is_empty() {
            return Err(ApiError::ValidationError("alert_id 不能为空".to_string()));
        }
        let repo = self.alerts.alert_repo();
        let alert = repo
            .find_by_id(alert_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RegulatorAlert(id={})不存在", alert_id)))?;
        let related_alerts = repo.find_related(&alert.farmer_id, alert_id, RELATED_ALERT_LIMIT)?;

        Ok(AlertDetail {
            alert,
            related_alerts,
        })
    }

    pub fn get_alert_stats(&self, farmer_id: Option<&str>) -> ApiResult<AlertStats> {
        let rows = self.alerts.alert_repo().count_grouped(farmer_id)?;
        Ok(AlertStats::from_rows(&rows))
    }

    /// 养殖户违规档案: 计数 + 最近预警 + 最近检测
    pub fn farm_violation_history(&self, farmer_id: &str) -> ApiResult<FarmViolationHistory> {
        if farmer_id.trim().is_empty() {
            return Err(ApiError::ValidationError("farmer_id 不能为空".to_string()));
        }
        let repo = self.alerts.alert_repo();
        let window_start = Utc::now() - Duration::days(self.window_days);

        let stats = AlertStats::from_rows(&repo.count_grouped(Some(farmer_id))?);
        let mrl_violations_in_window =
            repo.count_by_type_since(farmer_id, AlertType::MrlViolation, window_start)?;
        let blocked_sales_in_window =
            repo.count_by_type_since(farmer_id, AlertType::BlockedSaleAttempt, window_start)?;
        let (lab_tests_in_window, failed_lab_tests_in_window) =
            self.lab_test_repo.count_by_farmer(farmer_id, window_start)?;

        let recent_alerts = repo
            .list(&AlertFilter {
                farmer_id: Some(farmer_id.to_string()),
                page: 1,
                page_size: RECENT_LIMIT,
                ..AlertFilter::default()
            })?
            .items;
        let recent_lab_tests =
            self.lab_test_repo
                .find_recent_by_farmer(farmer_id, window_start, RECENT_LIMIT)?;

        Ok(FarmViolationHistory {
            farmer_id: farmer_id.to_string(),
            window_days: self.window_days,
            window_start,
            stats,
            mrl_violations_in_window,
            blocked_sales_in_window,
            lab_tests_in_window,
            failed_lab_tests_in_window,
            recent_alerts,
            recent_lab_tests,
        })
    }

    // ==========================================
    // 处理
    // ==========================================

    pub fn acknowledge(
        &self,
        alert_id: &str,
        actor_id: &str,
        expected_revision: Option<i32>,
    ) -> ApiResult<RegulatorAlert> {
        Ok(self.alerts.acknowledge(alert_id, actor_id, expected_revision)?)
    }

    pub fn update_status(
        &self,
        alert_id: &str,
        new_status: AlertStatus,
        notes: Option<&str>,
        actor_id: &str,
        expected_revision: Option<i32>,
    ) -> ApiResult<RegulatorAlert> {
        Ok(self
            .alerts
            .update_status(alert_id, new_status, notes, actor_id, expected_revision)?)
    }

    pub fn escalate(
        &self,
        alert_id: &str,
        actor_id: &str,
        expected_revision: Option<i32>,
    ) -> ApiResult<RegulatorAlert> {
        Ok(self.alerts.escalate(alert_id, actor_id, expected_revision)?)
    }
}
