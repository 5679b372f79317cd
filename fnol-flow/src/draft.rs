//! The accumulating record for one loss report.
//!
//! A `ClaimDraft` is created when a session starts and is mutated only by the
//! state machine in response to validated user input or evidence arrival.
//! Once the session reaches a terminal state the draft is never touched
//! again; retention and deletion are external concerns.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::ExtractedEntities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    Collision,
    Theft,
    Weather,
    Vandalism,
    Glass,
    Fire,
    Water,
    Other,
}

impl LossType {
    pub fn as_str(self) -> &'static str {
        match self {
            LossType::Collision => "collision",
            LossType::Theft => "theft",
            LossType::Weather => "weather",
            LossType::Vandalism => "vandalism",
            LossType::Glass => "glass",
            LossType::Fire => "fire",
            LossType::Water => "water",
            LossType::Other => "other",
        }
    }

    /// Keyword-based extraction from free text, used when the caller types an
    /// answer instead of picking an option.
    pub fn from_text(text: &str) -> Option<LossType> {
        let t = text.to_lowercase();
        let mappings: &[(LossType, &[&str])] = &[
            (
                LossType::Collision,
                &["collision", "accident", "crash", "hit", "rear-end", "wreck"],
            ),
            (LossType::Theft, &["theft", "stolen", "stole", "break-in"]),
            (
                LossType::Weather,
                &["weather", "hail", "storm", "wind", "tree", "lightning"],
            ),
            (LossType::Vandalism, &["vandal", "keyed", "graffiti"]),
            (LossType::Glass, &["glass", "windshield", "window", "chip"]),
            (LossType::Fire, &["fire", "burn", "smoke", "flame"]),
            (LossType::Water, &["water", "flood", "leak", "pipe"]),
            (LossType::Other, &["other", "something else"]),
        ];
        for (loss_type, keywords) in mappings {
            if keywords.iter().any(|kw| t.contains(kw)) {
                return Some(*loss_type);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjurySeverity {
    None,
    Unknown,
    Minor,
    Moderate,
    Severe,
    Fatal,
}

impl InjurySeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            InjurySeverity::None => "none",
            InjurySeverity::Unknown => "unknown",
            InjurySeverity::Minor => "minor",
            InjurySeverity::Moderate => "moderate",
            InjurySeverity::Severe => "severe",
            InjurySeverity::Fatal => "fatal",
        }
    }

    pub fn requires_emergency_handling(self) -> bool {
        matches!(self, InjurySeverity::Severe | InjurySeverity::Fatal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentLevel {
    None,
    Onsite,
    UrgentCare,
    Er,
    Admitted,
}

impl TreatmentLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TreatmentLevel::None => "none",
            TreatmentLevel::Onsite => "onsite",
            TreatmentLevel::UrgentCare => "urgent_care",
            TreatmentLevel::Er => "er",
            TreatmentLevel::Admitted => "admitted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Photo,
    PoliceReport,
    RepairEstimate,
    Invoice,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Verified,
    Failed,
}

/// An uploaded document or photo plus its extracted structured fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence_ref: String,
    pub kind: EvidenceKind,
    pub subtype: Option<String>,
    pub upload_status: UploadStatus,
    pub entities: Option<ExtractedEntities>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Pending,
    Matched,
    Guest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyInfo {
    pub confirmed_safe: Option<bool>,
    pub anyone_injured: Option<bool>,
    pub emergency_detected: bool,
    pub emergency_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMatch {
    pub status: IdentityStatus,
    pub policy_number: Option<String>,
}

impl Default for IdentityMatch {
    fn default() -> Self {
        Self {
            status: IdentityStatus::Pending,
            policy_number: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentFacts {
    pub loss_type: Option<LossType>,
    pub loss_subtype: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub time_approximate: bool,
    /// Set once the time question was answered (including a skip), so the
    /// dialogue does not re-ask an optional field.
    pub time_recorded: bool,
    pub location_raw: Option<String>,
    pub location_normalized: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleRole {
    Insured,
    ThirdParty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: Uuid,
    pub role: VehicleRole,
    pub description: Option<String>,
    pub year: Option<u16>,
    pub drivable: Option<bool>,
    pub tow_needed: Option<bool>,
}

impl Vehicle {
    pub fn insured(description: String, year: Option<u16>) -> Self {
        Self {
            vehicle_id: Uuid::new_v4(),
            role: VehicleRole::Insured,
            description: Some(description),
            year,
            drivable: None,
            tow_needed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdParty {
    pub party_id: Uuid,
    pub details: Option<String>,
    pub is_unknown: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThirdPartiesSection {
    pub other_party_involved: Option<bool>,
    pub parties: Vec<ThirdParty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Injury {
    pub injury_id: Uuid,
    pub severity: InjurySeverity,
    pub treatment_level: Option<TreatmentLevel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjuriesSection {
    pub reported_severity: Option<InjurySeverity>,
    pub treatment: Option<TreatmentLevel>,
    pub injuries: Vec<Injury>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DamageSection {
    pub areas: Vec<String>,
    pub description: Option<String>,
    pub estimated_amount: Option<Decimal>,
}

/// Filled in from police-report evidence when one arrives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoliceInfo {
    pub contacted: Option<bool>,
    pub report_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDraft {
    pub draft_id: Uuid,
    pub user_id: Option<String>,
    pub policy_id: Option<String>,

    pub safety: SafetyInfo,
    pub identity: IdentityMatch,
    pub incident: IncidentFacts,
    /// Scenario tags detected from the collected incident facts
    /// (hit_and_run, glass_only, vehicle_theft, ...).
    pub scenarios: Vec<String>,
    pub vehicles: Vec<Vehicle>,
    pub third_parties: ThirdPartiesSection,
    pub injuries: InjuriesSection,
    pub damage: DamageSection,
    pub police: PoliceInfo,
    pub evidence: Vec<EvidenceItem>,
    pub notes: Vec<String>,

    pub payout: Option<crate::payout::PayoutBreakdown>,
    pub claim_number: Option<String>,
}

impl ClaimDraft {
    pub fn new(policy_id: Option<String>, user_id: Option<String>) -> Self {
        Self {
            draft_id: Uuid::new_v4(),
            user_id,
            policy_id,
            safety: SafetyInfo::default(),
            identity: IdentityMatch::default(),
            incident: IncidentFacts::default(),
            scenarios: Vec::new(),
            vehicles: Vec::new(),
            third_parties: ThirdPartiesSection::default(),
            injuries: InjuriesSection::default(),
            damage: DamageSection::default(),
            police: PoliceInfo::default(),
            evidence: Vec::new(),
            notes: Vec::new(),
            payout: None,
            claim_number: None,
        }
    }

    pub fn insured_vehicle(&self) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.role == VehicleRole::Insured)
    }

    pub fn insured_vehicle_mut(&mut self) -> Option<&mut Vehicle> {
        self.vehicles
            .iter_mut()
            .find(|v| v.role == VehicleRole::Insured)
    }

    /// The claimant's estimated-damage figure used as the gross loss amount.
    pub fn estimated_damage(&self) -> Option<Decimal> {
        self.damage.estimated_amount
    }

    /// The evidence gate at DAMAGE_EVIDENCE: at least one damage photo has
    /// arrived and was not rejected by the extraction pipeline.
    pub fn has_damage_photo(&self) -> bool {
        self.evidence
            .iter()
            .any(|e| e.kind == EvidenceKind::Photo && e.upload_status != UploadStatus::Failed)
    }

    pub fn has_scenario(&self, tag: &str) -> bool {
        self.scenarios.iter().any(|s| s == tag)
    }

    pub fn add_scenario(&mut self, tag: &str) {
        if !self.has_scenario(tag) {
            self.scenarios.push(tag.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_type_from_free_text() {
        assert_eq!(
            LossType::from_text("someone rear-ended me"),
            Some(LossType::Collision)
        );
        assert_eq!(LossType::from_text("my car was stolen"), Some(LossType::Theft));
        assert_eq!(LossType::from_text("cracked windshield"), Some(LossType::Glass));
        assert_eq!(LossType::from_text("xyzzy"), None);
    }

    #[test]
    fn damage_photo_gate_ignores_failed_uploads() {
        let mut draft = ClaimDraft::new(None, None);
        assert!(!draft.has_damage_photo());

        draft.evidence.push(EvidenceItem {
            evidence_ref: "ev-1".into(),
            kind: EvidenceKind::Photo,
            subtype: None,
            upload_status: UploadStatus::Failed,
            entities: None,
        });
        assert!(!draft.has_damage_photo());

        draft.evidence.push(EvidenceItem {
            evidence_ref: "ev-2".into(),
            kind: EvidenceKind::Photo,
            subtype: Some("damage".into()),
            upload_status: UploadStatus::Uploaded,
            entities: None,
        });
        assert!(draft.has_damage_photo());
    }
}
