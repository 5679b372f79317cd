//! Read-only policy ledger adapter.
//!
//! The core only consumes the query contract: coverage limit, deductible,
//! ordered exclusion rules and the effective window. The ledger itself is an
//! external system; an in-memory implementation ships for tests and local
//! development.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::draft::{ClaimDraft, LossType};
use crate::error::{FnolError, Result};
use crate::session::ProductLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl EffectiveWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// How an exclusion rule adjusts the payout once its predicate matches.
///
/// Percentage adjustments apply to the *remaining* amount at the time the
/// rule is evaluated, which is why the policy's declared rule order must be
/// preserved exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExclusionAdjustment {
    Amount(Decimal),
    PercentOfRemaining(Decimal),
}

/// Predicate over claim facts, declared as data so the full rule set stays
/// serializable and auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExclusionPredicate {
    LossType { loss_type: LossType },
    LossSubtype { subtype: String },
    DescriptionKeyword { keyword: String },
    Always,
}

impl ExclusionPredicate {
    pub fn matches(&self, draft: &ClaimDraft) -> bool {
        match self {
            ExclusionPredicate::LossType { loss_type } => {
                draft.incident.loss_type == Some(*loss_type)
            }
            ExclusionPredicate::LossSubtype { subtype } => {
                draft.incident.loss_subtype.as_deref() == Some(subtype.as_str())
            }
            ExclusionPredicate::DescriptionKeyword { keyword } => {
                // Word-boundary match so "water damage" does not hit
                // "waterfront property".
                let Some(description) = draft.incident.description.as_deref() else {
                    return false;
                };
                let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
                regex::Regex::new(&pattern)
                    .map(|re| re.is_match(description))
                    .unwrap_or(false)
            }
            ExclusionPredicate::Always => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub rule_id: String,
    pub predicate: ExclusionPredicate,
    pub adjustment: ExclusionAdjustment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    pub policy_number: String,
    pub product_line: ProductLine,
    pub coverage_limit: Option<Decimal>,
    pub deductible: Option<Decimal>,
    /// Applied in declared order; order is significant.
    pub exclusion_rules: Vec<ExclusionRule>,
    pub effective_window: EffectiveWindow,
    pub total_loss_threshold: Option<Decimal>,
}

/// A minimal slice of the policy captured on the session at identity match,
/// so per-turn validation does not re-query the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policy_id: String,
    pub policy_number: String,
    pub product_line: ProductLine,
    pub effective_window: EffectiveWindow,
}

impl From<&Policy> for PolicySnapshot {
    fn from(policy: &Policy) -> Self {
        Self {
            policy_id: policy.policy_id.clone(),
            policy_number: policy.policy_number.clone(),
            product_line: policy.product_line,
            effective_window: policy.effective_window,
        }
    }
}

#[async_trait]
pub trait PolicyLedger: Send + Sync {
    async fn get_policy(&self, policy_id: &str) -> Result<Policy>;
}

/// In-memory ledger for tests and local development.
pub struct InMemoryPolicyLedger {
    policies: DashMap<String, Policy>,
}

impl InMemoryPolicyLedger {
    pub fn new() -> Self {
        Self {
            policies: DashMap::new(),
        }
    }

    pub fn insert(&self, policy: Policy) {
        self.policies.insert(policy.policy_id.clone(), policy);
    }
}

impl Default for InMemoryPolicyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyLedger for InMemoryPolicyLedger {
    async fn get_policy(&self, policy_id: &str) -> Result<Policy> {
        self.policies
            .get(policy_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| FnolError::PolicyNotFound(policy_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_with_description(description: &str) -> ClaimDraft {
        let mut draft = ClaimDraft::new(None, None);
        draft.incident.description = Some(description.to_string());
        draft
    }

    #[test]
    fn keyword_predicate_respects_word_boundaries() {
        let predicate = ExclusionPredicate::DescriptionKeyword {
            keyword: "racing".into(),
        };
        assert!(predicate.matches(&draft_with_description("we were racing on the highway")));
        assert!(!predicate.matches(&draft_with_description("near the bracing wall")));
    }

    #[tokio::test]
    async fn missing_policy_is_reported() {
        let ledger = InMemoryPolicyLedger::new();
        let err = ledger.get_policy("nope").await.unwrap_err();
        assert!(matches!(err, FnolError::PolicyNotFound(_)));
    }
}
