// ==========================================
// 畜产品合规引擎 - 合规状态判定引擎
// ==========================================
// 职责: 根据用药记录 + 检测结果, 派生牲畜产品当前是否可销售
// 输入: 用药记录 + 检测结果 + 评估时刻
// 输出: ComplianceReport (状态 + 原因 + 计数)
// ==========================================
// 红线: 纯函数, 无副作用; 相同输入必然相同输出
// 规则顺序: 基础规则自上而下取首个命中, 覆盖规则最后无条件执行
// ==========================================

use crate::domain::lab_test::LabTestResult;
use crate::domain::treatment::Treatment;
use crate::domain::types::ComplianceStatus;
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 默认回溯窗口 (天)
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

// ==========================================
// 输入 / 输出
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceQuery {
    pub animal_id: String,
    pub farmer_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub lookback_days: i64,
}

impl ComplianceQuery {
    pub fn new(animal_id: &str, farmer_id: &str, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            animal_id: animal_id.to_string(),
            farmer_id: farmer_id.to_string(),
            evaluated_at,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.evaluated_at - Duration::days(self.lookback_days)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCounts {
    pub treatments_in_window: usize,
    pub lab_tests_in_window: usize,
    pub failed_tests_in_window: usize,
    pub treatments_needing_test: usize,
    pub active_withdrawals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceDetails {
    pub latest_lab_test_id: Option<String>,
    pub latest_lab_test_passed: Option<bool>,
    pub latest_lab_test_date: Option<DateTime<Utc>>,
    pub treatments_needing_test: Vec<String>,
    pub active_withdrawal_treatments: Vec<String>,
    pub withdrawal_active_until: Option<DateTime<Utc>>,
    pub decided_by_rule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub animal_id: String,
    pub farmer_id: String,
    pub status: ComplianceStatus,
    pub can_sell_products: bool,
    pub explanation: String,
    pub counts: ComplianceCounts,
    pub details: ComplianceDetails,
    pub evaluated_at: DateTime<Utc>,
}

// ==========================================
// 规则表
// ==========================================

/// 规则求值上下文 (已按窗口过滤)
struct EvaluationContext<'a> {
    at: DateTime<Utc>,
    treatments_in_window: Vec<&'a Treatment>,
    tests_in_window: Vec<&'a LabTestResult>, // 检测时间倒序
    needing_test: Vec<&'a Treatment>,
    active_withdrawals: Vec<&'a Treatment>,
}

struct Verdict {
    status: ComplianceStatus,
    explanation: String,
}

type Rule = fn(&EvaluationContext<'_>) -> Option<Verdict>;

/// 基础规则: 取首个命中
const BASE_RULES: &[(&str, Rule)] = &[
    ("treatments_needing_test", rule_test_required),
    ("latest_lab_test", rule_latest_lab_test),
    ("no_blocking_history", rule_default_safe),
];

/// 覆盖规则: 基础规则之后无条件求值, 命中即覆盖
const OVERRIDE_RULES: &[(&str, Rule)] = &[("active_withdrawal", rule_withdrawal_active)];

fn rule_test_required(ctx: &EvaluationContext<'_>) -> Option<Verdict> {
    if ctx.needing_test.is_empty() {
        return None;
    }
    let drugs: Vec<&str> = ctx.needing_test.iter().map(|t| t.drug_name.as_str()).collect();
    Some(Verdict {
        status: ComplianceStatus::TestRequired,
        explanation: format!(
            "休药期已结束但缺少残留检测: {} 条用药记录待检 ({})",
            ctx.needing_test.len(),
            drugs.join(", ")
        ),
    })
}

fn rule_latest_lab_test(ctx: &EvaluationContext<'_>) -> Option<Verdict> {
    let latest = ctx.tests_in_window.first()?;
    if latest.passed {
        Some(Verdict {
            status: ComplianceStatus::Safe,
            explanation: format!(
                "最近一次检测合格: {} {} {} (限量 {})",
                latest.drug_name, latest.residue_level, latest.unit, latest.mrl_threshold
            ),
        })
    } else {
        Some(Verdict {
            status: ComplianceStatus::Violation,
            explanation: format!(
                "最近一次检测超标: {} {} {} > 限量 {}",
                latest.drug_name, latest.residue_level, latest.unit, latest.mrl_threshold
            ),
        })
    }
}

fn rule_default_safe(ctx: &EvaluationContext<'_>) -> Option<Verdict> {
    let explanation = if ctx.treatments_in_window.is_empty() && ctx.tests_in_window.is_empty() {
        "回溯窗口内无用药及检测记录".to_string()
    } else {
        "回溯窗口内无待检用药且无检测结果".to_string()
    };
    Some(Verdict {
        status: ComplianceStatus::Safe,
        explanation,
    })
}

fn rule_withdrawal_active(ctx: &EvaluationContext<'_>) -> Option<Verdict> {
    let until = ctx.active_withdrawals.iter().map(|t| t.withdrawal_end_date).max()?;
    let drugs: Vec<&str> = ctx.active_withdrawals.iter().map(|t| t.drug_name.as_str()).collect();
    let remaining = (until - ctx.at).num_days();
    Some(Verdict {
        status: ComplianceStatus::WithdrawalActive,
        explanation: format!(
            "休药期中 ({}), 截止 {} (剩余约 {} 天)",
            drugs.join(", "),
            until.format("%Y-%m-%d %H:%M UTC"),
            remaining
        ),
    })
}

// ==========================================
// ComplianceStatusResolver - 合规状态判定引擎
// ==========================================
pub struct ComplianceStatusResolver {
    // 无状态引擎
}

impl Default for ComplianceStatusResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplianceStatusResolver {
    pub fn new() -> Self {
        Self {}
    }

    /// 判定合规状态
    ///
    /// # 参数
    /// - `query`: 牲畜/养殖户/评估时刻/回溯天数
    /// - `treatments`: 该牲畜的用药记录 (任意顺序)
    /// - `lab_tests`: 该牲畜的检测结果 (任意顺序)
    ///
    /// # 说明
    /// - 仅已批准 (APPROVED) 用药参与判定
    /// - 仅统计归属于 `query.farmer_id` 的记录
    /// - 同一检测时间的多条结果, 超标结果优先
    pub fn resolve(
        &self,
        query: &ComplianceQuery,
        treatments: &[Treatment],
        lab_tests: &[LabTestResult],
    ) -> EngineResult<ComplianceReport> {
        if query.animal_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("animal_id 不能为空".to_string()));
        }
        if query.farmer_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("farmer_id 不能为空".to_string()));
        }
        if query.lookback_days <= 0 {
            return Err(EngineError::InvalidInput(format!(
                "lookback_days 必须为正数: {}",
                query.lookback_days
            )));
        }

        let at = query.evaluated_at;
        let from = query.window_start();

        let owned =
            |animal_id: &str, farmer_id: &str| animal_id == query.animal_id && farmer_id == query.farmer_id;

        let approved: Vec<&Treatment> = treatments
            .iter()
            .filter(|t| owned(&t.animal_id, &t.farmer_id) && t.is_approved())
            .collect();

        let treatments_in_window: Vec<&Treatment> = approved
            .iter()
            .copied()
            .filter(|t| t.start_date >= from && t.start_date <= at)
            .collect();

        let mut tests_in_window: Vec<&LabTestResult> = lab_tests
            .iter()
            .filter(|l| owned(&l.animal_id, &l.farmer_id) && l.test_date >= from && l.test_date <= at)
            .collect();
        // 检测时间倒序; 同一时间超标优先; 再按 id 保证确定性
        tests_in_window.sort_by(|a, b| {
            b.test_date
                .cmp(&a.test_date)
                .then(a.passed.cmp(&b.passed))
                .then(a.lab_test_id.cmp(&b.lab_test_id))
        });

        let needing_test: Vec<&Treatment> = treatments_in_window
            .iter()
            .copied()
            .filter(|t| t.needs_test_at(at))
            .collect();

        let active_withdrawals: Vec<&Treatment> = approved
            .iter()
            .copied()
            .filter(|t| t.withdrawal_active_at(at))
            .collect();

        let ctx = EvaluationContext {
            at,
            treatments_in_window,
            tests_in_window,
            needing_test,
            active_withdrawals,
        };

        let (mut rule_name, mut verdict) = BASE_RULES
            .iter()
            .find_map(|(name, rule)| rule(&ctx).map(|v| (*name, v)))
            .unwrap_or((
                "no_blocking_history",
                Verdict {
                    status: ComplianceStatus::Safe,
                    explanation: String::new(),
                },
            ));

        for (name, rule) in OVERRIDE_RULES {
            if let Some(v) = rule(&ctx) {
                rule_name = *name;
                verdict = v;
            }
        }

        let latest = ctx.tests_in_window.first();
        let counts = ComplianceCounts {
            treatments_in_window: ctx.treatments_in_window.len(),
            lab_tests_in_window: ctx.tests_in_window.len(),
            failed_tests_in_window: ctx.tests_in_window.iter().filter(|l| !l.passed).count(),
            treatments_needing_test: ctx.needing_test.len(),
            active_withdrawals: ctx.active_withdrawals.len(),
        };
        let details = ComplianceDetails {
            latest_lab_test_id: latest.map(|l| l.lab_test_id.clone()),
            latest_lab_test_passed: latest.map(|l| l.passed),
            latest_lab_test_date: latest.map(|l| l.test_date),
            treatments_needing_test: ctx.needing_test.iter().map(|t| t.treatment_id.clone()).collect(),
            active_withdrawal_treatments: ctx
                .active_withdrawals
                .iter()
                .map(|t| t.treatment_id.clone())
                .collect(),
            withdrawal_active_until: ctx.active_withdrawals.iter().map(|t| t.withdrawal_end_date).max(),
            decided_by_rule: rule_name.to_string(),
        };

        Ok(ComplianceReport {
            animal_id: query.animal_id.clone(),
            farmer_id: query.farmer_id.clone(),
            status: verdict.status,
            can_sell_products: verdict.status.allows_sale(),
            explanation: verdict.explanation,
            counts,
            details,
            evaluated_at: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ApprovalStatus, ReviewStatus};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn treatment(id: &str, drug: &str, start_days_ago: i64, end_offset_days: i64) -> Treatment {
        Treatment {
            treatment_id: id.to_string(),
            animal_id: "A1".to_string(),
            farmer_id: "F1".to_string(),
            drug_name: drug.to_string(),
            start_date: now() - Duration::days(start_days_ago),
            withdrawal_end_date: now() + Duration::days(end_offset_days),
            approval_status: ApprovalStatus::Approved,
            approved_by: Some("VET".to_string()),
            mrl_compliant: None,
            requires_mrl_test: true,
            linked_lab_test_ids: vec![],
            created_at: now() - Duration::days(start_days_ago),
        }
    }

    fn lab_test(id: &str, days_ago: i64, passed: bool) -> LabTestResult {
        LabTestResult {
            lab_test_id: id.to_string(),
            animal_id: "A1".to_string(),
            farmer_id: "F1".to_string(),
            drug_name: "penicillin".to_string(),
            residue_level: if passed { 10.0 } else { 150.0 },
            mrl_threshold: 100.0,
            unit: "µg/kg".to_string(),
            test_date: now() - Duration::days(days_ago),
            passed,
            review_status: ReviewStatus::PendingVerification,
            violation_resolved: false,
        }
    }

    fn resolve(treatments: &[Treatment], tests: &[LabTestResult]) -> ComplianceReport {
        ComplianceStatusResolver::new()
            .resolve(&ComplianceQuery::new("A1", "F1", now()), treatments, tests)
            .unwrap()
    }

    #[test]
    fn test_no_history_is_safe() {
        let report = resolve(&[], &[]);
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert!(report.can_sell_products);
        assert_eq!(report.counts, ComplianceCounts::default());
    }

    #[test]
    fn test_active_withdrawal_overrides_passed_test() {
        let treatments = vec![treatment("T1", "penicillin", 2, 5)];
        let tests = vec![lab_test("L1", 1, true)];
        let report = resolve(&treatments, &tests);

        assert_eq!(report.status, ComplianceStatus::WithdrawalActive);
        assert!(!report.can_sell_products);
        assert_eq!(report.details.decided_by_rule, "active_withdrawal");
        assert_eq!(report.counts.active_withdrawals, 1);
    }

    #[test]
    fn test_any_concurrent_treatment_triggers_override() {
        let mut ended = treatment("T1", "penicillin", 20, -5);
        ended.linked_lab_test_ids = vec!["L1".to_string()];
        let treatments = vec![ended, treatment("T2", "ivermectin", 1, 10)];
        let report = resolve(&treatments, &[lab_test("L1", 3, true)]);
        assert_eq!(report.status, ComplianceStatus::WithdrawalActive);
        assert_eq!(report.details.active_withdrawal_treatments, vec!["T2".to_string()]);
    }

    #[test]
    fn test_ended_withdrawal_without_test_requires_test() {
        let treatments = vec![treatment("T1", "penicillin", 20, -2)];
        let report = resolve(&treatments, &[lab_test("L9", 30, true)]);
        assert_eq!(report.status, ComplianceStatus::TestRequired);
        assert!(!report.can_sell_products);
        assert_eq!(report.details.treatments_needing_test, vec!["T1".to_string()]);
    }

    #[test]
    fn test_treatment_not_flagged_does_not_require_test() {
        let mut t = treatment("T1", "penicillin", 20, -2);
        t.requires_mrl_test = false;
        let report = resolve(&[t], &[]);
        assert_eq!(report.status, ComplianceStatus::Safe);
    }

    #[test]
    fn test_latest_test_wins_over_older_failure() {
        let tests = vec![lab_test("OLD", 10, false), lab_test("NEW", 2, true)];
        let report = resolve(&[], &tests);
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert_eq!(report.details.latest_lab_test_id.as_deref(), Some("NEW"));
        assert_eq!(report.counts.failed_tests_in_window, 1);
    }

    #[test]
    fn test_latest_failed_test_is_violation() {
        let tests = vec![lab_test("OLD", 10, true), lab_test("NEW", 2, false)];
        let report = resolve(&[], &tests);
        assert_eq!(report.status, ComplianceStatus::Violation);
        assert!(!report.can_sell_products);
    }

    #[test]
    fn test_same_timestamp_failure_takes_precedence() {
        let tests = vec![lab_test("A", 2, true), lab_test("B", 2, false)];
        let report = resolve(&[], &tests);
        assert_eq!(report.status, ComplianceStatus::Violation);
    }

    #[test]
    fn test_records_outside_window_are_ignored() {
        let tests = vec![lab_test("L1", 120, false)];
        let report = resolve(&[], &tests);
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert_eq!(report.counts.lab_tests_in_window, 0);
    }

    #[test]
    fn test_pending_treatment_is_ignored() {
        let mut t = treatment("T1", "penicillin", 1, 10);
        t.approval_status = ApprovalStatus::Pending;
        let report = resolve(&[t], &[]);
        assert_eq!(report.status, ComplianceStatus::Safe);
    }

    #[test]
    fn test_records_of_other_farmer_are_ignored() {
        // 牲畜转户后, 原养殖户名下记录不参与判定
        let mut t = treatment("T1", "penicillin", 1, 10);
        t.farmer_id = "F2".to_string();
        let mut l = lab_test("L1", 1, false);
        l.farmer_id = "F2".to_string();

        let report = resolve(&[t], &[l]);
        assert_eq!(report.status, ComplianceStatus::Safe);
        assert_eq!(report.counts.lab_tests_in_window, 0);
        assert_eq!(report.counts.active_withdrawals, 0);
    }

    #[test]
    fn test_identical_inputs_identical_outputs() {
        let treatments = vec![treatment("T1", "penicillin", 20, -2)];
        let tests = vec![lab_test("L1", 5, true), lab_test("L2", 5, false)];
        assert_eq!(resolve(&treatments, &tests), resolve(&treatments, &tests));
    }

    #[test]
    fn test_rejects_empty_ids() {
        let resolver = ComplianceStatusResolver::new();
        let err = resolver
            .resolve(&ComplianceQuery::new("", "F1", now()), &[], &[])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
