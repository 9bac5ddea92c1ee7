// ==========================================
// 畜产品合规引擎 - 核心库
// ==========================================
// 职责: 销售资格判定 / 超标分级 / 监管预警 / 休药期调度
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 养殖档案访问
pub mod repository;

// 引擎层 - 纯业务规则
pub mod engine;

// 配置层 - 策略参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// 通知派发协作方
pub mod notification;

// 服务层 - 有副作用的流程
pub mod services;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AlertStatus, AlertType, ApprovalStatus, ComplianceStatus, ReviewStatus, RiskLevel, Severity,
};

// 领域实体
pub use domain::{Animal, LabTestResult, NewAlert, RegulatorAlert, Treatment};

// 引擎
pub use engine::{ComplianceReport, ComplianceStatusResolver, PatternEvaluator, ViolationClassifier};

// 服务
pub use services::{
    AlertLifecycleManager, PatternDetector, ViolationIntakeService, WithdrawalCountdownScheduler,
    WithdrawalExpiryReconciler,
};

// API
pub use api::{AlertApi, ComplianceApi, OperationsApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "畜产品合规引擎";
