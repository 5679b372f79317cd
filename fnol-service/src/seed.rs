//! Demo policies for local development, so a fresh service can run the full
//! flow without an external ledger.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use fnol_flow::{
    EffectiveWindow, ExclusionAdjustment, ExclusionPredicate, ExclusionRule,
    InMemoryPolicyLedger, LossType, Policy, ProductLine,
};

pub fn seed_demo_policies(ledger: &InMemoryPolicyLedger) {
    let window = EffectiveWindow {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2027, 12, 31).unwrap(),
    };

    ledger.insert(Policy {
        policy_id: "demo-auto-1001".into(),
        policy_number: "AUTO-1001".into(),
        product_line: ProductLine::Auto,
        coverage_limit: Some(Decimal::from(50_000)),
        deductible: Some(Decimal::from(500)),
        exclusion_rules: vec![ExclusionRule {
            rule_id: "racing_exclusion".into(),
            predicate: ExclusionPredicate::DescriptionKeyword {
                keyword: "racing".into(),
            },
            adjustment: ExclusionAdjustment::PercentOfRemaining(Decimal::from(100)),
        }],
        effective_window: window,
        total_loss_threshold: Some(Decimal::from(37_500)),
    });

    ledger.insert(Policy {
        policy_id: "demo-home-2001".into(),
        policy_number: "HOME-2001".into(),
        product_line: ProductLine::Home,
        coverage_limit: Some(Decimal::from(250_000)),
        deductible: Some(Decimal::from(1_000)),
        exclusion_rules: vec![ExclusionRule {
            rule_id: "flood_exclusion".into(),
            predicate: ExclusionPredicate::LossType {
                loss_type: LossType::Water,
            },
            adjustment: ExclusionAdjustment::PercentOfRemaining(Decimal::from(50)),
        }],
        effective_window: window,
        total_loss_threshold: None,
    });

    info!("seeded demo policies: demo-auto-1001, demo-home-2001");
}
