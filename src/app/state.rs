// ==========================================
// 畜产品合规引擎 - 应用状态
// ==========================================
// 职责: 从数据库路径装配仓储/引擎/服务/API
// 约束: 需在 tokio 运行时内创建 (模式检测 worker 随状态启动)
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::task::JoinHandle;

use crate::api::{AlertApi, ComplianceApi, OperationsApi};
use crate::config::config_manager::ConfigManager;
use crate::config::policy::CompliancePolicy;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::violation_classifier::ViolationClassifier;
use crate::notification::{LoggingDispatcher, NotificationDispatcher};
use crate::repository::{
    AnimalRepository, CountdownNotificationRepository, LabTestRepository,
    RegulatorAlertRepository, TreatmentRepository,
};
use crate::services::{
    AlertLifecycleManager, DailyScheduler, PatternDetector, PatternWorker, ViolationIntakeService,
    WithdrawalCountdownScheduler, WithdrawalExpiryReconciler,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的策略
    pub policy: CompliancePolicy,

    pub config_manager: Arc<ConfigManager>,

    // ===== 仓储 =====
    pub animal_repo: Arc<AnimalRepository>,
    pub treatment_repo: Arc<TreatmentRepository>,
    pub lab_test_repo: Arc<LabTestRepository>,
    pub alert_repo: Arc<RegulatorAlertRepository>,
    pub countdown_repo: Arc<CountdownNotificationRepository>,

    // ===== 服务 =====
    pub alerts: AlertLifecycleManager,
    pub intake: Arc<ViolationIntakeService>,
    pub countdown_scheduler: Arc<WithdrawalCountdownScheduler>,
    pub expiry_reconciler: Arc<WithdrawalExpiryReconciler>,

    // ===== API =====
    pub compliance_api: Arc<ComplianceApi>,
    pub alert_api: Arc<AlertApi>,
    pub operations_api: Arc<OperationsApi>,

    pattern_worker: JoinHandle<()>,
}

impl AppState {
    /// 创建新的AppState实例 (通知仅写日志)
    ///
    /// # 返回
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_dispatcher(db_path, Arc::new(LoggingDispatcher))
    }

    pub fn with_dispatcher(
        db_path: String,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)), dispatcher)
    }

    /// 基于已建表的共享连接装配
    pub fn from_connection(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self, String> {
        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法初始化ConfigManager: {}", e))?,
        );
        let policy = config_manager
            .load_policy()
            .map_err(|e| format!("策略加载失败: {}", e))?;

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let animal_repo = Arc::new(AnimalRepository::new(conn.clone()));
        let treatment_repo = Arc::new(TreatmentRepository::new(conn.clone()));
        let lab_test_repo = Arc::new(LabTestRepository::new(conn.clone()));
        let alert_repo = Arc::new(RegulatorAlertRepository::new(conn.clone()));
        let countdown_repo = Arc::new(CountdownNotificationRepository::new(conn));

        // ==========================================
        // 初始化Service层
        // ==========================================
        let base_alerts = AlertLifecycleManager::new(
            alert_repo.clone(),
            lab_test_repo.clone(),
            dispatcher.clone(),
            policy.regulator_recipient.clone(),
        );

        // worker 持有不带触发器的副本, 所有触发器释放后 worker 自然退出
        let detector = PatternDetector::new(base_alerts.clone(), policy.pattern.clone());
        let (trigger, pattern_worker) = PatternWorker::spawn(detector);
        let alerts = base_alerts.with_pattern_trigger(trigger);

        let intake = Arc::new(ViolationIntakeService::new(
            animal_repo.clone(),
            treatment_repo.clone(),
            lab_test_repo.clone(),
            alerts.clone(),
            ViolationClassifier::new(policy.classifier.clone()),
        ));
        let countdown_scheduler = Arc::new(WithdrawalCountdownScheduler::new(
            treatment_repo.clone(),
            countdown_repo.clone(),
            dispatcher.clone(),
            policy.countdown.clone(),
        ));
        let expiry_reconciler = Arc::new(WithdrawalExpiryReconciler::new(
            animal_repo.clone(),
            dispatcher,
        ));

        // ==========================================
        // 初始化API层
        // ==========================================
        let compliance_api = Arc::new(ComplianceApi::new(
            animal_repo.clone(),
            treatment_repo.clone(),
            lab_test_repo.clone(),
            alerts.clone(),
            policy.lookback_days,
        ));
        let alert_api = Arc::new(AlertApi::new(
            alerts.clone(),
            lab_test_repo.clone(),
            policy.pattern.window_days,
        ));
        let operations_api = Arc::new(OperationsApi::new(
            countdown_scheduler.clone(),
            expiry_reconciler.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            policy,
            config_manager,
            animal_repo,
            treatment_repo,
            lab_test_repo,
            alert_repo,
            countdown_repo,
            alerts,
            intake,
            countdown_scheduler,
            expiry_reconciler,
            compliance_api,
            alert_api,
            operations_api,
            pattern_worker,
        })
    }

    /// 每日调度 (与手动触发共用同一调度实例)
    pub fn daily_scheduler(&self) -> DailyScheduler {
        DailyScheduler::new(
            self.countdown_scheduler.clone(),
            self.expiry_reconciler.clone(),
            self.policy.schedule.clone(),
        )
    }

    /// 释放所有服务并等待模式检测队列处理完毕
    pub async fn shutdown(self) {
        let worker = self.into_pattern_worker();
        if let Err(e) = worker.await {
            tracing::error!("模式检测 worker 异常退出: {}", e);
        }
    }

    // 其余字段在此返回时释放, 触发器随之关闭
    fn into_pattern_worker(self) -> JoinHandle<()> {
        self.pattern_worker
    }
}

/// 获取默认数据库路径
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("LIVESTOCK_COMPLIANCE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./livestock_compliance.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("livestock-compliance");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("livestock_compliance.db");
        }
    }

    path.to_string_lossy().to_string()
}
