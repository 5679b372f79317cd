//! Deterministic payout calculation.
//!
//! All financial arithmetic lives here, on `Decimal`. The formula:
//!
//! `net = max(0, gross - deductible - sum(exclusion adjustments))`
//!
//! Exclusion rules run in the policy's declared order. Percentage rules
//! apply to the remaining amount at the time they run, so the order is not
//! commutative and must be preserved exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::draft::ClaimDraft;
use crate::error::{FnolError, Result};
use crate::policy::{ExclusionAdjustment, Policy};

fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionApplied {
    pub rule_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBreakdown {
    pub gross_loss: Decimal,
    pub deductible_applied: Decimal,
    pub exclusion_adjustments: Vec<ExclusionApplied>,
    pub net_payout: Decimal,
    pub is_total_loss: bool,
}

/// Compute the payout for a validated claim draft against its policy.
///
/// Fails with `PolicyDataIncomplete` when the deductible or coverage limit
/// is missing; missing policy data is reported, never defaulted.
pub fn calculate(policy: &Policy, draft: &ClaimDraft) -> Result<PayoutBreakdown> {
    let deductible = policy.deductible.ok_or_else(|| {
        FnolError::PolicyDataIncomplete(format!("policy {} has no deductible", policy.policy_id))
    })?;
    let coverage_limit = policy.coverage_limit.ok_or_else(|| {
        FnolError::PolicyDataIncomplete(format!(
            "policy {} has no coverage limit",
            policy.policy_id
        ))
    })?;
    let gross = draft.estimated_damage().ok_or_else(|| {
        FnolError::PolicyDataIncomplete("claim has no corroborated damage estimate".to_string())
    })?;

    if gross < Decimal::ZERO || deductible < Decimal::ZERO || coverage_limit < Decimal::ZERO {
        return Err(FnolError::PolicyDataIncomplete(
            "monetary inputs must be non-negative".to_string(),
        ));
    }

    let deductible_applied = deductible.min(gross);
    let mut remaining = gross - deductible_applied;

    let mut applied = Vec::new();
    for rule in &policy.exclusion_rules {
        if !rule.predicate.matches(draft) {
            continue;
        }
        let amount = match &rule.adjustment {
            ExclusionAdjustment::Amount(amount) => *amount,
            ExclusionAdjustment::PercentOfRemaining(pct) => {
                round_currency(remaining * *pct / Decimal::ONE_HUNDRED)
            }
        };
        // Each adjustment is capped at what is left, so the net floors at
        // zero without ever going negative mid-computation.
        let amount = amount.min(remaining).max(Decimal::ZERO);
        remaining -= amount;
        applied.push(ExclusionApplied {
            rule_id: rule.rule_id.clone(),
            amount,
        });
    }

    let is_total_loss = match policy.total_loss_threshold {
        Some(threshold) => gross >= threshold,
        None => gross > coverage_limit,
    };

    Ok(PayoutBreakdown {
        gross_loss: round_currency(gross),
        deductible_applied: round_currency(deductible_applied),
        exclusion_adjustments: applied,
        net_payout: round_currency(remaining),
        is_total_loss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{EffectiveWindow, ExclusionPredicate, ExclusionRule};
    use crate::session::ProductLine;
    use chrono::NaiveDate;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_policy(deductible: &str, limit: &str, rules: Vec<ExclusionRule>) -> Policy {
        Policy {
            policy_id: "pol-1".into(),
            policy_number: "AUTO-0001".into(),
            product_line: ProductLine::Auto,
            coverage_limit: Some(dec(limit)),
            deductible: Some(dec(deductible)),
            exclusion_rules: rules,
            effective_window: EffectiveWindow {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            },
            total_loss_threshold: None,
        }
    }

    fn draft_with_estimate(amount: &str) -> ClaimDraft {
        let mut draft = ClaimDraft::new(Some("pol-1".into()), None);
        draft.damage.estimated_amount = Some(dec(amount));
        draft
    }

    fn always_rule(rule_id: &str, adjustment: ExclusionAdjustment) -> ExclusionRule {
        ExclusionRule {
            rule_id: rule_id.into(),
            predicate: ExclusionPredicate::Always,
            adjustment,
        }
    }

    #[test]
    fn basic_payout_applies_deductible_once() {
        let policy = test_policy("500", "50000", vec![]);
        let draft = draft_with_estimate("3000");

        let breakdown = calculate(&policy, &draft).unwrap();
        assert_eq!(breakdown.net_payout, dec("2500"));
        assert_eq!(breakdown.deductible_applied, dec("500"));
        assert!(!breakdown.is_total_loss);
    }

    #[test]
    fn claim_below_deductible_floors_at_zero() {
        let policy = test_policy("500", "50000", vec![]);
        let draft = draft_with_estimate("300");

        let breakdown = calculate(&policy, &draft).unwrap();
        assert_eq!(breakdown.net_payout, Decimal::ZERO);
        assert_eq!(breakdown.deductible_applied, dec("300"));
    }

    #[test]
    fn exclusion_order_is_not_commutative() {
        let flat = always_rule("flat_1000", ExclusionAdjustment::Amount(dec("1000")));
        let pct = always_rule(
            "pct_10",
            ExclusionAdjustment::PercentOfRemaining(dec("10")),
        );
        let draft = draft_with_estimate("10000");

        let policy_ab = test_policy("0", "50000", vec![flat.clone(), pct.clone()]);
        let breakdown = calculate(&policy_ab, &draft).unwrap();
        // 10000 - 1000 = 9000, then 10% of 9000 = 900 -> 8100
        assert_eq!(breakdown.net_payout, dec("8100.00"));

        let policy_ba = test_policy("0", "50000", vec![pct, flat]);
        let breakdown = calculate(&policy_ba, &draft).unwrap();
        // 10% of 10000 = 1000 -> 9000, then 1000 -> 8000
        assert_eq!(breakdown.net_payout, dec("8000.00"));
    }

    #[test]
    fn net_matches_invariant_formula() {
        let rules = vec![
            always_rule("a", ExclusionAdjustment::Amount(dec("250"))),
            always_rule("b", ExclusionAdjustment::PercentOfRemaining(dec("25"))),
        ];
        let policy = test_policy("500", "50000", rules);
        let draft = draft_with_estimate("4500");

        let breakdown = calculate(&policy, &draft).unwrap();
        let adjustment_total: Decimal = breakdown
            .exclusion_adjustments
            .iter()
            .map(|a| a.amount)
            .sum();
        let expected = (breakdown.gross_loss - breakdown.deductible_applied - adjustment_total)
            .max(Decimal::ZERO);
        assert_eq!(breakdown.net_payout, expected);
    }

    #[test]
    fn total_loss_uses_declared_threshold_then_limit() {
        let mut policy = test_policy("500", "20000", vec![]);
        policy.total_loss_threshold = Some(dec("15000"));
        let breakdown = calculate(&policy, &draft_with_estimate("16000")).unwrap();
        assert!(breakdown.is_total_loss);

        policy.total_loss_threshold = None;
        let breakdown = calculate(&policy, &draft_with_estimate("16000")).unwrap();
        assert!(!breakdown.is_total_loss);

        let breakdown = calculate(&policy, &draft_with_estimate("25000")).unwrap();
        assert!(breakdown.is_total_loss);
    }

    #[test]
    fn missing_policy_fields_are_reported_not_defaulted() {
        let mut policy = test_policy("500", "50000", vec![]);
        policy.deductible = None;
        let err = calculate(&policy, &draft_with_estimate("3000")).unwrap_err();
        assert!(matches!(err, FnolError::PolicyDataIncomplete(_)));

        let mut policy = test_policy("500", "50000", vec![]);
        policy.coverage_limit = None;
        let err = calculate(&policy, &draft_with_estimate("3000")).unwrap_err();
        assert!(matches!(err, FnolError::PolicyDataIncomplete(_)));
    }

    #[test]
    fn non_matching_exclusions_do_not_apply() {
        let rule = ExclusionRule {
            rule_id: "racing".into(),
            predicate: ExclusionPredicate::DescriptionKeyword {
                keyword: "racing".into(),
            },
            adjustment: ExclusionAdjustment::PercentOfRemaining(dec("100")),
        };
        let policy = test_policy("500", "50000", vec![rule]);
        let mut draft = draft_with_estimate("3000");
        draft.incident.description = Some("parked car was hit overnight".into());

        let breakdown = calculate(&policy, &draft).unwrap();
        assert!(breakdown.exclusion_adjustments.is_empty());
        assert_eq!(breakdown.net_payout, dec("2500"));
    }
}
