// ==========================================
// 畜产品合规引擎 - 违规模式判定引擎
// ==========================================
// 输入: 滚动窗口内的预警计数 + 最近一次同类模式预警
// 输出: 是否需要生成模式预警 (REPEATED_VIOLATION / COMPLIANCE_PATTERN)
// 抑制: 抑制期内同类模式预警不重复生成, 严重程度升级除外
// ==========================================

use crate::config::policy::PatternPolicy;
use crate::domain::types::{AlertType, RiskLevel, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 最近一次已生成的模式预警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorPatternAlert {
    pub created_at: DateTime<Utc>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternObservation {
    pub farmer_id: String,
    pub observed_at: DateTime<Utc>,
    pub mrl_violation_count: u64,
    pub blocked_sale_count: u64,
    pub last_repeated_violation: Option<PriorPatternAlert>,
    pub last_compliance_pattern: Option<PriorPatternAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternDecision {
    /// 生成新模式预警
    Emit {
        alert_type: AlertType,
        severity: Severity,
        risk_level: RiskLevel,
        count: u64,
    },
    /// 已越过阈值, 但处于抑制期
    Suppressed {
        alert_type: AlertType,
        severity: Severity,
        count: u64,
        last_emitted_at: DateTime<Utc>,
    },
}

// ==========================================
// PatternEvaluator - 模式判定
// ==========================================
#[derive(Debug, Clone)]
pub struct PatternEvaluator {
    policy: PatternPolicy,
}

impl Default for PatternEvaluator {
    fn default() -> Self {
        Self::new(PatternPolicy::default())
    }
}

impl PatternEvaluator {
    pub fn new(policy: PatternPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PatternPolicy {
        &self.policy
    }

    /// 窗口起点
    pub fn window_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at - Duration::days(self.policy.window_days)
    }

    /// 判定 (未越过阈值的类型不出现在结果中)
    pub fn evaluate(&self, obs: &PatternObservation) -> Vec<PatternDecision> {
        let mut decisions = Vec::new();

        if obs.mrl_violation_count >= self.policy.repeat_threshold {
            let severity = if obs.mrl_violation_count >= self.policy.repeat_critical_threshold {
                Severity::Critical
            } else {
                Severity::High
            };
            decisions.push(self.decide(
                AlertType::RepeatedViolation,
                severity,
                obs.mrl_violation_count,
                obs.observed_at,
                obs.last_repeated_violation.as_ref(),
            ));
        }

        if obs.blocked_sale_count >= self.policy.blocked_sale_threshold {
            decisions.push(self.decide(
                AlertType::CompliancePattern,
                Severity::High,
                obs.blocked_sale_count,
                obs.observed_at,
                obs.last_compliance_pattern.as_ref(),
            ));
        }

        decisions
    }

    fn decide(
        &self,
        alert_type: AlertType,
        severity: Severity,
        count: u64,
        at: DateTime<Utc>,
        prior: Option<&PriorPatternAlert>,
    ) -> PatternDecision {
        if let Some(prior) = prior {
            let in_cooldown = self.policy.cooldown_days > 0
                && prior.created_at > at - Duration::days(self.policy.cooldown_days);
            if in_cooldown && severity <= prior.severity {
                return PatternDecision::Suppressed {
                    alert_type,
                    severity,
                    count,
                    last_emitted_at: prior.created_at,
                };
            }
        }

        let risk_level = match severity {
            Severity::Critical => RiskLevel::ImmediateAction,
            _ => RiskLevel::HighPriority,
        };
        PatternDecision::Emit {
            alert_type,
            severity,
            risk_level,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(mrl: u64, blocked: u64) -> PatternObservation {
        PatternObservation {
            farmer_id: "F1".to_string(),
            observed_at: Utc::now(),
            mrl_violation_count: mrl,
            blocked_sale_count: blocked,
            last_repeated_violation: None,
            last_compliance_pattern: None,
        }
    }

    #[test]
    fn test_below_thresholds_emits_nothing() {
        assert!(PatternEvaluator::default().evaluate(&obs(2, 4)).is_empty());
    }

    #[test]
    fn test_third_violation_is_high_fifth_is_critical() {
        let evaluator = PatternEvaluator::default();
        match &evaluator.evaluate(&obs(3, 0))[0] {
            PatternDecision::Emit { alert_type, severity, .. } => {
                assert_eq!(*alert_type, AlertType::RepeatedViolation);
                assert_eq!(*severity, Severity::High);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
        match &evaluator.evaluate(&obs(5, 0))[0] {
            PatternDecision::Emit { severity, risk_level, .. } => {
                assert_eq!(*severity, Severity::Critical);
                assert_eq!(*risk_level, RiskLevel::ImmediateAction);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_blocked_sales_pattern() {
        let decisions = PatternEvaluator::default().evaluate(&obs(0, 5));
        assert_eq!(
            decisions,
            vec![PatternDecision::Emit {
                alert_type: AlertType::CompliancePattern,
                severity: Severity::High,
                risk_level: RiskLevel::HighPriority,
                count: 5,
            }]
        );
    }

    #[test]
    fn test_cooldown_suppresses_same_severity_but_not_escalation() {
        let evaluator = PatternEvaluator::default();
        let mut o = obs(4, 0);
        o.last_repeated_violation = Some(PriorPatternAlert {
            created_at: o.observed_at - Duration::days(1),
            severity: Severity::High,
        });
        assert!(matches!(
            evaluator.evaluate(&o)[0],
            PatternDecision::Suppressed { .. }
        ));

        o.mrl_violation_count = 5;
        assert!(matches!(
            evaluator.evaluate(&o)[0],
            PatternDecision::Emit { severity: Severity::Critical, .. }
        ));
    }

    #[test]
    fn test_cooldown_expires() {
        let evaluator = PatternEvaluator::default();
        let mut o = obs(4, 0);
        o.last_repeated_violation = Some(PriorPatternAlert {
            created_at: o.observed_at - Duration::days(8),
            severity: Severity::High,
        });
        assert!(matches!(evaluator.evaluate(&o)[0], PatternDecision::Emit { .. }));
    }

    #[test]
    fn test_zero_cooldown_never_suppresses() {
        let evaluator = PatternEvaluator::new(PatternPolicy {
            cooldown_days: 0,
            ..PatternPolicy::default()
        });
        let mut o = obs(3, 0);
        o.last_repeated_violation = Some(PriorPatternAlert {
            created_at: o.observed_at,
            severity: Severity::Critical,
        });
        assert!(matches!(evaluator.evaluate(&o)[0], PatternDecision::Emit { .. }));
    }
}
