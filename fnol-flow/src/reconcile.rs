//! Reconciliation protocol: two evaluators and a supervisor.
//!
//! The statement evaluator checks the internal consistency of what the
//! claimant reported. The document evaluator compares extraction output from
//! uploaded evidence against the claimant's statement. The two have no
//! ordering dependency and run concurrently; the supervisor is a
//! deterministic function over both outputs and the admin-configured
//! thresholds. Ties always resolve to the more conservative outcome:
//! escalate over request-more-info over approve.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::draft::ClaimDraft;
use crate::session::FnolState;
use crate::validation::MIN_DESCRIPTION_LEN;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Minimum evaluator confidence for auto-approval, in [0, 1].
    pub confidence_threshold: f64,
    /// Maximum claimed amount eligible for auto-approval.
    pub auto_approval_limit: Decimal,
    /// Days of tolerance when comparing dates across sources.
    pub date_tolerance_days: i64,
    /// Percent difference tolerated between claimed and documented amounts.
    pub amount_tolerance_pct: Decimal,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            auto_approval_limit: Decimal::from(20_000),
            date_tolerance_days: 1,
            amount_tolerance_pct: Decimal::from(20),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementReview {
    pub confidence: f64,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancySeverity {
    /// Resolvable by a follow-up question to the claimant.
    Low,
    /// Requires human review; never auto-approved around.
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: String,
    pub severity: DiscrepancySeverity,
    pub detail: String,
}

impl Discrepancy {
    /// The upstream state that owns the contested field, used to route a
    /// request-more-info decision back through the conversation.
    pub fn owning_state(&self) -> FnolState {
        match self.field.as_str() {
            "incident_date" | "incident_location" => FnolState::IncidentCore,
            "estimated_damage" => FnolState::DamageEvidence,
            _ => FnolState::IncidentCore,
        }
    }

    pub fn follow_up_question(&self) -> String {
        match self.field.as_str() {
            "incident_date" => {
                "Your documents show a different incident date than you reported. \
                 Could you confirm the date the incident occurred?"
                    .to_string()
            }
            "incident_location" => {
                "Your documents mention a different location than you reported. \
                 Could you confirm where the incident occurred?"
                    .to_string()
            }
            "estimated_damage" => {
                "Your documents show a different damage amount than your estimate. \
                 Could you confirm the estimated damage amount?"
                    .to_string()
            }
            field => format!("Could you confirm the {field} you reported?"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReview {
    pub confidence: f64,
    pub discrepancies: Vec<Discrepancy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReconcileDecision {
    Approve,
    RequestMoreInfo {
        state: FnolState,
        field: String,
        question: String,
    },
    Escalate {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationVerdict {
    pub statement: StatementReview,
    pub documents: DocumentReview,
    pub decision: ReconcileDecision,
    pub reason: String,
}

/// Internal consistency of the claimant-provided facts.
pub fn evaluate_statement(draft: &ClaimDraft, today: NaiveDate) -> StatementReview {
    let mut confidence: f64 = 1.0;
    let mut flags = Vec::new();

    match draft.incident.date {
        None => {
            confidence -= 0.4;
            flags.push("incident date missing".to_string());
        }
        Some(date) if date > today => {
            confidence -= 0.4;
            flags.push("incident date after report date".to_string());
        }
        Some(_) => {}
    }

    match draft.incident.location_raw.as_deref() {
        None => {
            confidence -= 0.3;
            flags.push("incident location missing".to_string());
        }
        Some(location) if location.trim().len() < 5 => {
            confidence -= 0.2;
            flags.push("incident location too vague".to_string());
        }
        Some(_) => {}
    }

    match draft.incident.description.as_deref() {
        None => {
            confidence -= 0.3;
            flags.push("incident description missing".to_string());
        }
        Some(description) if description.trim().len() < MIN_DESCRIPTION_LEN => {
            confidence -= 0.2;
            flags.push("incident description trivial".to_string());
        }
        Some(_) => {}
    }

    match draft.damage.estimated_amount {
        None => {
            confidence -= 0.2;
            flags.push("damage estimate missing".to_string());
        }
        Some(amount) if amount <= Decimal::ZERO => {
            confidence -= 0.2;
            flags.push("damage estimate not positive".to_string());
        }
        Some(_) => {}
    }

    StatementReview {
        confidence: confidence.clamp(0.0, 1.0),
        flags,
    }
}

/// Lowercase alphanumeric words longer than two characters, for the
/// normalized-substring location match.
fn significant_words(text: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &["the", "and", "near", "street", "ave", "avenue", "road"];
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn locations_agree(claimed: &str, documented: &str) -> bool {
    let claimed_norm = claimed.to_lowercase();
    let documented_norm = documented.to_lowercase();
    if claimed_norm.contains(documented_norm.trim()) || documented_norm.contains(claimed_norm.trim())
    {
        return true;
    }
    let doc_words = significant_words(documented);
    significant_words(claimed)
        .iter()
        .any(|w| doc_words.contains(w))
}

/// Compare evidence-store-extracted entities against the claimant's
/// statement fields.
pub fn evaluate_documents(draft: &ClaimDraft, config: &ReconcileConfig) -> DocumentReview {
    let mut discrepancies = Vec::new();
    let mut confidence_scores = Vec::new();

    for item in &draft.evidence {
        let Some(entities) = item.entities.as_ref() else {
            continue;
        };
        confidence_scores.push(entities.confidence);

        if let (Some(claimed), Some(documented)) = (draft.incident.date, entities.incident_date) {
            let diff = (documented - claimed).num_days().abs();
            if diff > config.date_tolerance_days {
                discrepancies.push(Discrepancy {
                    field: "incident_date".to_string(),
                    severity: DiscrepancySeverity::Low,
                    detail: format!(
                        "reported {claimed} but {} shows {documented} ({diff} days apart, \
                         tolerance {} days)",
                        item.evidence_ref, config.date_tolerance_days
                    ),
                });
            }
        }

        if let (Some(claimed), Some(documented)) = (
            draft.incident.location_raw.as_deref(),
            entities.location.as_deref(),
        ) {
            if !locations_agree(claimed, documented) {
                discrepancies.push(Discrepancy {
                    field: "incident_location".to_string(),
                    severity: DiscrepancySeverity::Low,
                    detail: format!(
                        "reported location {claimed:?} does not match {:?} from {}",
                        documented, item.evidence_ref
                    ),
                });
            }
        }

        if let (Some(claimed), Some(documented)) =
            (draft.damage.estimated_amount, entities.total_amount)
        {
            if claimed > Decimal::ZERO {
                let diff_pct =
                    ((claimed - documented).abs() / claimed) * Decimal::ONE_HUNDRED;
                if diff_pct > config.amount_tolerance_pct {
                    // Large unexplained amount gaps are a fraud signal, not a
                    // follow-up question.
                    let severity = if diff_pct > config.amount_tolerance_pct * Decimal::TWO {
                        DiscrepancySeverity::High
                    } else {
                        DiscrepancySeverity::Low
                    };
                    discrepancies.push(Discrepancy {
                        field: "estimated_damage".to_string(),
                        severity,
                        detail: format!(
                            "claimed {claimed} differs from documented {documented} by {:.1}%",
                            diff_pct
                        ),
                    });
                }
            }
        }
    }

    let base_confidence = if confidence_scores.is_empty() {
        // No extracted entities to contradict the statement; neutral score.
        0.75
    } else {
        confidence_scores.iter().sum::<f64>() / confidence_scores.len() as f64
    };
    let high = discrepancies
        .iter()
        .filter(|d| d.severity == DiscrepancySeverity::High)
        .count() as f64;
    let low = discrepancies
        .iter()
        .filter(|d| d.severity == DiscrepancySeverity::Low)
        .count() as f64;
    let confidence = (base_confidence - high * 0.2 - low * 0.1).clamp(0.0, 1.0);

    DocumentReview {
        confidence,
        discrepancies,
    }
}

/// Deterministic decision over both evaluators' outputs.
pub fn supervise(
    statement: &StatementReview,
    documents: &DocumentReview,
    claimed_amount: Option<Decimal>,
    config: &ReconcileConfig,
) -> (ReconcileDecision, String) {
    if statement.confidence < config.confidence_threshold {
        let reason = format!(
            "Statement confidence {:.2} below threshold {:.2}: {}",
            statement.confidence,
            config.confidence_threshold,
            statement.flags.join("; ")
        );
        return (ReconcileDecision::Escalate { reason: reason.clone() }, reason);
    }
    if documents.confidence < config.confidence_threshold {
        let reason = format!(
            "Document confidence {:.2} below threshold {:.2}",
            documents.confidence, config.confidence_threshold
        );
        return (ReconcileDecision::Escalate { reason: reason.clone() }, reason);
    }
    if let Some(discrepancy) = documents
        .discrepancies
        .iter()
        .find(|d| d.severity == DiscrepancySeverity::High)
    {
        let reason = format!("High-severity discrepancy: {}", discrepancy.detail);
        return (ReconcileDecision::Escalate { reason: reason.clone() }, reason);
    }
    if let Some(discrepancy) = documents.discrepancies.first() {
        let reason = format!("Discrepancy needs follow-up: {}", discrepancy.detail);
        return (
            ReconcileDecision::RequestMoreInfo {
                state: discrepancy.owning_state(),
                field: discrepancy.field.clone(),
                question: discrepancy.follow_up_question(),
            },
            reason,
        );
    }
    match claimed_amount {
        Some(amount) if amount > config.auto_approval_limit => {
            let reason = format!(
                "Claimed amount {amount} exceeds auto-approval limit {}",
                config.auto_approval_limit
            );
            (ReconcileDecision::Escalate { reason: reason.clone() }, reason)
        }
        None => {
            // No corroborated amount at all: never auto-approve on ambiguous
            // evidence.
            let reason = "No claimed amount available for auto-approval".to_string();
            (ReconcileDecision::Escalate { reason: reason.clone() }, reason)
        }
        Some(_) => {
            let reason = "Evaluators agree and amount is within the auto-approval limit".to_string();
            (ReconcileDecision::Approve, reason)
        }
    }
}

/// Run the full protocol once: both evaluators fanned out concurrently,
/// then the supervisor joined over their outputs.
pub async fn reconcile(
    draft: &ClaimDraft,
    config: &ReconcileConfig,
    today: NaiveDate,
) -> ReconciliationVerdict {
    let (statement, documents) = tokio::join!(
        async { evaluate_statement(draft, today) },
        async { evaluate_documents(draft, config) },
    );

    let (decision, reason) = supervise(&statement, &documents, draft.estimated_damage(), config);
    debug!(
        statement_confidence = statement.confidence,
        document_confidence = documents.confidence,
        discrepancies = documents.discrepancies.len(),
        reason = %reason,
        "reconciliation verdict"
    );

    ReconciliationVerdict {
        statement,
        documents,
        decision,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::{EvidenceItem, EvidenceKind, UploadStatus};
    use crate::evidence::ExtractedEntities;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn complete_draft() -> ClaimDraft {
        let mut draft = ClaimDraft::new(Some("pol-1".into()), None);
        draft.incident.date = Some(NaiveDate::from_ymd_opt(2026, 5, 20).unwrap());
        draft.incident.location_raw = Some("Main St and 5th Ave, Springfield".into());
        draft.incident.description =
            Some("Another car ran a red light and hit my front bumper".into());
        draft.damage.estimated_amount = Some(dec("3000"));
        draft
    }

    fn photo_with(entities: ExtractedEntities) -> EvidenceItem {
        EvidenceItem {
            evidence_ref: "ev-photo".into(),
            kind: EvidenceKind::Photo,
            subtype: Some("damage".into()),
            upload_status: UploadStatus::Verified,
            entities: Some(entities),
        }
    }

    fn police_report(date: NaiveDate) -> EvidenceItem {
        EvidenceItem {
            evidence_ref: "ev-police".into(),
            kind: EvidenceKind::PoliceReport,
            subtype: None,
            upload_status: UploadStatus::Verified,
            entities: Some(ExtractedEntities {
                incident_date: Some(date),
                location: Some("Main St, Springfield".into()),
                report_number: Some("PR-123".into()),
                total_amount: None,
                confidence: 0.9,
            }),
        }
    }

    #[tokio::test]
    async fn consistent_claim_is_approved() {
        let mut draft = complete_draft();
        draft
            .evidence
            .push(police_report(NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()));

        let verdict = reconcile(&draft, &ReconcileConfig::default(), today()).await;
        assert!(matches!(verdict.decision, ReconcileDecision::Approve));
        assert!(verdict.statement.confidence >= 0.99);
    }

    #[tokio::test]
    async fn date_mismatch_beyond_tolerance_requests_more_info() {
        let mut draft = complete_draft();
        draft.incident.date = Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        draft
            .evidence
            .push(police_report(NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()));

        let verdict = reconcile(&draft, &ReconcileConfig::default(), today()).await;
        match verdict.decision {
            ReconcileDecision::RequestMoreInfo { state, field, .. } => {
                assert_eq!(state, FnolState::IncidentCore);
                assert_eq!(field, "incident_date");
            }
            other => panic!("expected RequestMoreInfo, got {other:?}"),
        }
        assert_eq!(verdict.documents.discrepancies.len(), 1);
    }

    #[tokio::test]
    async fn one_day_difference_is_within_tolerance() {
        let mut draft = complete_draft();
        draft.incident.date = Some(NaiveDate::from_ymd_opt(2026, 5, 20).unwrap());
        draft
            .evidence
            .push(police_report(NaiveDate::from_ymd_opt(2026, 5, 21).unwrap()));

        let verdict = reconcile(&draft, &ReconcileConfig::default(), today()).await;
        assert!(matches!(verdict.decision, ReconcileDecision::Approve));
    }

    #[tokio::test]
    async fn amount_over_auto_approval_limit_escalates() {
        let mut draft = complete_draft();
        draft.damage.estimated_amount = Some(dec("50000"));

        let verdict = reconcile(&draft, &ReconcileConfig::default(), today()).await;
        match &verdict.decision {
            ReconcileDecision::Escalate { reason } => {
                assert!(reason.contains("auto-approval limit"));
            }
            other => panic!("expected Escalate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn thin_statement_escalates_on_low_confidence() {
        let mut draft = ClaimDraft::new(None, None);
        draft.damage.estimated_amount = Some(dec("1000"));

        let verdict = reconcile(&draft, &ReconcileConfig::default(), today()).await;
        assert!(matches!(
            verdict.decision,
            ReconcileDecision::Escalate { .. }
        ));
        assert!(!verdict.statement.flags.is_empty());
    }

    #[tokio::test]
    async fn large_amount_gap_is_high_severity_and_escalates() {
        let mut draft = complete_draft();
        draft.evidence.push(photo_with(ExtractedEntities {
            incident_date: None,
            location: None,
            report_number: None,
            // Claimed 3000, documented 1000: 66% gap, beyond 2x tolerance.
            total_amount: Some(dec("1000")),
            confidence: 0.9,
        }));

        let verdict = reconcile(&draft, &ReconcileConfig::default(), today()).await;
        assert!(matches!(
            verdict.decision,
            ReconcileDecision::Escalate { .. }
        ));
        assert_eq!(
            verdict.documents.discrepancies[0].severity,
            DiscrepancySeverity::High
        );
    }

    #[test]
    fn location_match_tolerates_formatting() {
        assert!(locations_agree(
            "Main St and 5th Ave, Springfield",
            "MAIN ST, SPRINGFIELD"
        ));
        assert!(!locations_agree("Oak Hollow parking lot", "Riverside Mall"));
    }
}
