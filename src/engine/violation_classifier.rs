// ==========================================
// 畜产品合规引擎 - 残留超标分级引擎
// ==========================================
// 输入: 检出残留量 + MRL 限量
// 输出: 超出量 / 超出百分比 / 严重程度 / 风险处置等级
// 规则 (严格大于):
// - > critical_pct  -> CRITICAL / IMMEDIATE_ACTION
// - > high_pct      -> HIGH / HIGH_PRIORITY
// - 其余            -> MEDIUM / MONITOR
// ==========================================

use crate::config::policy::ClassifierPolicy;
use crate::domain::types::{RiskLevel, Severity};
use crate::engine::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationClassification {
    pub residue_level_detected: f64,
    pub mrl_threshold: f64,
    pub exceeded_by: f64,
    pub percentage_over: f64,
    pub severity: Severity,
    pub risk_level: RiskLevel,
}

// ==========================================
// ViolationClassifier - 超标分级引擎
// ==========================================
#[derive(Debug, Clone)]
pub struct ViolationClassifier {
    policy: ClassifierPolicy,
}

impl Default for ViolationClassifier {
    fn default() -> Self {
        Self::new(ClassifierPolicy::default())
    }
}

impl ViolationClassifier {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// 分级
    ///
    /// # 错误
    /// - `EngineError::InvalidInput`: 限量非正数或数值非有限
    pub fn classify(
        &self,
        residue_level_detected: f64,
        mrl_threshold: f64,
    ) -> EngineResult<ViolationClassification> {
        if !mrl_threshold.is_finite() || mrl_threshold <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "MRL 限量必须为正数: {}",
                mrl_threshold
            )));
        }
        if !residue_level_detected.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "检出残留量非法: {}",
                residue_level_detected
            )));
        }

        let exceeded_by = residue_level_detected - mrl_threshold;
        let percentage_over = exceeded_by / mrl_threshold * 100.0;

        let (severity, risk_level) = if percentage_over > self.policy.critical_pct {
            (Severity::Critical, RiskLevel::ImmediateAction)
        } else if percentage_over > self.policy.high_pct {
            (Severity::High, RiskLevel::HighPriority)
        } else {
            (Severity::Medium, RiskLevel::Monitor)
        };

        Ok(ViolationClassification {
            residue_level_detected,
            mrl_threshold,
            exceeded_by,
            percentage_over,
            severity,
            risk_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_fifty_percent_is_medium() {
        let c = ViolationClassifier::default().classify(150.0, 100.0).unwrap();
        assert_eq!(c.exceeded_by, 50.0);
        assert_eq!(c.percentage_over, 50.0);
        assert_eq!(c.severity, Severity::Medium);
        assert_eq!(c.risk_level, RiskLevel::Monitor);
    }

    #[test]
    fn test_just_above_fifty_percent_is_high() {
        let c = ViolationClassifier::default().classify(150.01, 100.0).unwrap();
        assert!((c.percentage_over - 50.01).abs() < 1e-9);
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.risk_level, RiskLevel::HighPriority);
    }

    #[test]
    fn test_one_hundred_fifty_percent_is_critical() {
        let c = ViolationClassifier::default().classify(250.0, 100.0).unwrap();
        assert_eq!(c.percentage_over, 150.0);
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.risk_level, RiskLevel::ImmediateAction);
    }

    #[test]
    fn test_exactly_one_hundred_percent_is_high() {
        let c = ViolationClassifier::default().classify(200.0, 100.0).unwrap();
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        let classifier = ViolationClassifier::default();
        assert!(matches!(classifier.classify(10.0, 0.0), Err(EngineError::InvalidInput(_))));
        assert!(matches!(classifier.classify(10.0, -5.0), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_custom_policy() {
        let classifier = ViolationClassifier::new(ClassifierPolicy {
            critical_pct: 20.0,
            high_pct: 10.0,
        });
        assert_eq!(classifier.classify(125.0, 100.0).unwrap().severity, Severity::Critical);
        assert_eq!(classifier.classify(115.0, 100.0).unwrap().severity, Severity::High);
        assert_eq!(classifier.classify(110.0, 100.0).unwrap().severity, Severity::Medium);
    }
}
