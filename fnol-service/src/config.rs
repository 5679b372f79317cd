//! Supervisor thresholds from the environment.
//!
//! These are admin-configured business parameters, not code constants:
//! tolerance values and the escalation tie-break are owned by the policy
//! side of the house and can change without a deploy.

use fnol_flow::ReconcileConfig;
use tracing::warn;

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

pub fn load_reconcile_config() -> ReconcileConfig {
    let defaults = ReconcileConfig::default();
    ReconcileConfig {
        confidence_threshold: env_parse("CONFIDENCE_THRESHOLD", defaults.confidence_threshold)
            .clamp(0.0, 1.0),
        auto_approval_limit: env_parse("AUTO_APPROVAL_LIMIT", defaults.auto_approval_limit),
        date_tolerance_days: env_parse("DATE_TOLERANCE_DAYS", defaults.date_tolerance_days),
        amount_tolerance_pct: env_parse("AMOUNT_TOLERANCE_PCT", defaults.amount_tolerance_pct),
    }
}
