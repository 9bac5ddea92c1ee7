// ==========================================
// 畜产品合规引擎 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 用药审批状态 (Treatment Approval Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,  // 待兽医审批
    Approved, // 已批准 (休药期生效)
    Rejected, // 已驳回
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ApprovalStatus::Pending),
            "APPROVED" => Some(ApprovalStatus::Approved),
            "REJECTED" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 检测结果复核状态 (Lab Test Review Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    PendingVerification, // 待核验
    Verified,            // 已核验
    Approved,            // 监管通过
    Rejected,            // 监管驳回
    Flagged,             // 已标记
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::PendingVerification => "PENDING_VERIFICATION",
            ReviewStatus::Verified => "VERIFIED",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::Flagged => "FLAGGED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING_VERIFICATION" => Some(ReviewStatus::PendingVerification),
            "VERIFIED" => Some(ReviewStatus::Verified),
            "APPROVED" => Some(ReviewStatus::Approved),
            "REJECTED" => Some(ReviewStatus::Rejected),
            "FLAGGED" => Some(ReviewStatus::Flagged),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 合规状态 (Compliance Status)
// ==========================================
// 派生值,不落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Safe,             // 可销售
    TestRequired,     // 休药期结束,待残留检测
    Violation,        // 最近一次检测超标
    WithdrawalActive, // 休药期中
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Safe => "SAFE",
            ComplianceStatus::TestRequired => "TEST_REQUIRED",
            ComplianceStatus::Violation => "VIOLATION",
            ComplianceStatus::WithdrawalActive => "WITHDRAWAL_ACTIVE",
        }
    }

    /// 只有 SAFE 允许销售
    pub fn allows_sale(&self) -> bool {
        matches!(self, ComplianceStatus::Safe)
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 监管预警类型 (Alert Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    MrlViolation,        // 残留超标
    RepeatedViolation,   // 重复超标 (模式预警)
    BlockedSaleAttempt,  // 违规销售被拦截
    MissingMrlTest,      // 缺少残留检测
    ExpiredTestDetected, // 检测结果过期
    CompliancePattern,   // 合规异常模式
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::MrlViolation => "MRL_VIOLATION",
            AlertType::RepeatedViolation => "REPEATED_VIOLATION",
            AlertType::BlockedSaleAttempt => "BLOCKED_SALE_ATTEMPT",
            AlertType::MissingMrlTest => "MISSING_MRL_TEST",
            AlertType::ExpiredTestDetected => "EXPIRED_TEST_DETECTED",
            AlertType::CompliancePattern => "COMPLIANCE_PATTERN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MRL_VIOLATION" => Some(AlertType::MrlViolation),
            "REPEATED_VIOLATION" => Some(AlertType::RepeatedViolation),
            "BLOCKED_SALE_ATTEMPT" => Some(AlertType::BlockedSaleAttempt),
            "MISSING_MRL_TEST" => Some(AlertType::MissingMrlTest),
            "EXPIRED_TEST_DETECTED" => Some(AlertType::ExpiredTestDetected),
            "COMPLIANCE_PATTERN" => Some(AlertType::CompliancePattern),
            _ => None,
        }
    }

    /// 该类型的新预警是否触发模式检测
    pub fn triggers_pattern_check(&self) -> bool {
        matches!(self, AlertType::MrlViolation | AlertType::BlockedSaleAttempt)
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 严重程度 (Severity)
// ==========================================
// 顺序: Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 风险处置等级 (Risk Level)
// ==========================================
// 顺序: LowRisk < Monitor < HighPriority < ImmediateAction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    LowRisk,
    Monitor,
    HighPriority,
    ImmediateAction,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::LowRisk => "LOW_RISK",
            RiskLevel::Monitor => "MONITOR",
            RiskLevel::HighPriority => "HIGH_PRIORITY",
            RiskLevel::ImmediateAction => "IMMEDIATE_ACTION",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW_RISK" => Some(RiskLevel::LowRisk),
            "MONITOR" => Some(RiskLevel::Monitor),
            "HIGH_PRIORITY" => Some(RiskLevel::HighPriority),
            "IMMEDIATE_ACTION" => Some(RiskLevel::ImmediateAction),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 预警处理状态 (Alert Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Investigating,
    Resolved,
    Escalated,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "NEW",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Investigating => "INVESTIGATING",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::Escalated => "ESCALATED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(AlertStatus::New),
            "ACKNOWLEDGED" => Some(AlertStatus::Acknowledged),
            "INVESTIGATING" => Some(AlertStatus::Investigating),
            "RESOLVED" => Some(AlertStatus::Resolved),
            "ESCALATED" => Some(AlertStatus::Escalated),
            _ => None,
        }
    }

    /// 状态迁移表
    ///
    /// - RESOLVED 为终态
    /// - ESCALATED -> ESCALATED 仅允许 escalate 操作 (重复升级幂等)
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        match (self, next) {
            (New, Acknowledged) | (New, Investigating) | (New, Resolved) | (New, Escalated) => true,
            (Acknowledged, Investigating) | (Acknowledged, Resolved) | (Acknowledged, Escalated) => {
                true
            }
            (Investigating, Resolved) | (Investigating, Escalated) => true,
            (Escalated, Investigating) | (Escalated, Resolved) | (Escalated, Escalated) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
