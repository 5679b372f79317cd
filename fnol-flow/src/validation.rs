//! Per-state validation rules.
//!
//! Pure, stateless predicate-and-message functions, one per state,
//! parameterized by product line. Every rule that fails contributes a
//! message; nothing short-circuits, so the claimant sees all problems in a
//! single round trip.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::draft::{ClaimDraft, InjurySeverity, LossType};
use crate::policy::PolicySnapshot;
use crate::session::{FnolState, ProductLine};

pub const MIN_LOCATION_LEN: usize = 5;
pub const MIN_DESCRIPTION_LEN: usize = 20;

/// Validate the data a state is responsible for. An empty list means the
/// state's collection is complete and consistent.
pub fn validate_state(
    state: FnolState,
    draft: &ClaimDraft,
    line: ProductLine,
    policy: Option<&PolicySnapshot>,
    today: NaiveDate,
) -> Vec<String> {
    match state {
        FnolState::SafetyCheck => validate_safety(draft),
        FnolState::IdentityMatch => validate_identity(draft),
        FnolState::IncidentCore => validate_incident_core(draft, line, policy, today),
        FnolState::LossModule => Vec::new(),
        FnolState::VehicleDriver => validate_vehicle_driver(draft, line),
        FnolState::ThirdParties => validate_third_parties(draft, line),
        FnolState::Injuries => validate_injuries(draft),
        FnolState::DamageEvidence => validate_damage_evidence(draft, line),
        FnolState::Triage
        | FnolState::ClaimCreate
        | FnolState::NextSteps
        | FnolState::HandoffEscalation => Vec::new(),
    }
}

/// The union of every collection state's rules, used to decide whether a
/// draft could be submitted as-is.
pub fn validate_for_submission(
    draft: &ClaimDraft,
    line: ProductLine,
    policy: Option<&PolicySnapshot>,
    today: NaiveDate,
) -> Vec<String> {
    let mut errors = Vec::new();
    for state in crate::session::required_states(line) {
        errors.extend(validate_state(state, draft, line, policy, today));
    }
    if !draft.has_damage_photo() {
        errors.push("A photo of the damage is required before submission".to_string());
    }
    errors
}

fn validate_safety(draft: &ClaimDraft) -> Vec<String> {
    let mut errors = Vec::new();
    if draft.safety.confirmed_safe != Some(true) {
        errors.push("Safety has not been confirmed".to_string());
    }
    if draft.safety.anyone_injured.is_none() {
        errors.push("The injury check has not been answered".to_string());
    }
    errors
}

fn validate_identity(draft: &ClaimDraft) -> Vec<String> {
    use crate::draft::IdentityStatus;
    match draft.identity.status {
        IdentityStatus::Pending => vec!["Identity has not been matched".to_string()],
        IdentityStatus::Matched | IdentityStatus::Guest => Vec::new(),
    }
}

/// Loss types that require a follow-up subtype answer.
pub fn subtype_required(loss_type: LossType) -> bool {
    matches!(
        loss_type,
        LossType::Collision | LossType::Weather | LossType::Theft
    )
}

fn validate_incident_core(
    draft: &ClaimDraft,
    _line: ProductLine,
    policy: Option<&PolicySnapshot>,
    today: NaiveDate,
) -> Vec<String> {
    let mut errors = Vec::new();
    let incident = &draft.incident;

    match incident.loss_type {
        None => errors.push("Please select an incident type".to_string()),
        Some(loss_type) => {
            if subtype_required(loss_type) && incident.loss_subtype.is_none() {
                errors.push("Please tell us a bit more about the incident type".to_string());
            }
        }
    }

    match incident.date {
        None => errors.push("Please enter the incident date".to_string()),
        Some(date) => {
            if date > today {
                errors.push("The incident date cannot be in the future".to_string());
            }
            if let Some(snapshot) = policy {
                if !snapshot.effective_window.contains(date) {
                    errors.push(format!(
                        "The incident date is outside the policy coverage period ({} to {})",
                        snapshot.effective_window.start, snapshot.effective_window.end
                    ));
                }
            }
        }
    }

    match incident.location_raw.as_deref() {
        None => errors.push("Please tell us where the incident occurred".to_string()),
        Some(location) if location.trim().len() < MIN_LOCATION_LEN => {
            errors.push("Please provide a more specific location".to_string());
        }
        Some(_) => {}
    }

    match incident.description.as_deref() {
        None => errors.push("Please describe what happened".to_string()),
        Some(description) if description.trim().len() < MIN_DESCRIPTION_LEN => {
            errors.push("Please provide more detail about what happened".to_string());
        }
        Some(_) => {}
    }

    errors
}

fn validate_vehicle_driver(draft: &ClaimDraft, line: ProductLine) -> Vec<String> {
    if line != ProductLine::Auto {
        return Vec::new();
    }
    let mut errors = Vec::new();
    match draft.insured_vehicle() {
        None => errors.push("Please describe the insured vehicle".to_string()),
        Some(vehicle) => {
            if vehicle.drivable.is_none() {
                errors.push("Please tell us whether the vehicle is drivable".to_string());
            }
            if vehicle.drivable == Some(false) && vehicle.tow_needed.is_none() {
                errors.push("Please tell us whether you need a tow".to_string());
            }
            if let Some(year) = vehicle.year {
                if !(1950..=2100).contains(&year) {
                    errors.push("The vehicle year does not look right".to_string());
                }
            }
        }
    }
    errors
}

fn validate_third_parties(draft: &ClaimDraft, line: ProductLine) -> Vec<String> {
    if line != ProductLine::Auto {
        return Vec::new();
    }
    let mut errors = Vec::new();
    match draft.third_parties.other_party_involved {
        None => errors.push("Please tell us whether another party was involved".to_string()),
        Some(true) if draft.third_parties.parties.is_empty() => {
            errors.push("Please provide the other party's details".to_string());
        }
        _ => {}
    }
    errors
}

fn validate_injuries(draft: &ClaimDraft) -> Vec<String> {
    let mut errors = Vec::new();
    match draft.injuries.reported_severity {
        None => errors.push("Please tell us whether anyone was injured".to_string()),
        Some(InjurySeverity::None) => {}
        Some(_) => {
            if draft.injuries.treatment.is_none() {
                errors.push("Please tell us what treatment was needed".to_string());
            }
        }
    }
    errors
}

fn validate_damage_evidence(draft: &ClaimDraft, _line: ProductLine) -> Vec<String> {
    let mut errors = Vec::new();
    if draft.damage.areas.is_empty() {
        errors.push("Please select which areas were damaged".to_string());
    }
    match draft.damage.description.as_deref() {
        None => errors.push("Please describe the damage".to_string()),
        Some(description) if description.trim().is_empty() => {
            errors.push("Please describe the damage".to_string());
        }
        Some(_) => {}
    }
    match draft.damage.estimated_amount {
        None => errors.push("Please provide a damage estimate".to_string()),
        Some(amount) if amount < Decimal::ZERO => {
            errors.push("The damage estimate cannot be negative".to_string());
        }
        Some(_) => {}
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EffectiveWindow;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn all_violations_reported_together() {
        let draft = ClaimDraft::new(None, None);
        let errors = validate_state(
            FnolState::IncidentCore,
            &draft,
            ProductLine::Auto,
            None,
            today(),
        );
        // type, date, location, description all missing at once
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn future_date_rejected() {
        let mut draft = ClaimDraft::new(None, None);
        draft.incident.loss_type = Some(LossType::Glass);
        draft.incident.date = Some(today() + chrono::Duration::days(1));
        draft.incident.location_raw = Some("5th and Main, Springfield".into());
        draft.incident.description = Some("a rock cracked the windshield on the highway".into());

        let errors = validate_state(
            FnolState::IncidentCore,
            &draft,
            ProductLine::Auto,
            None,
            today(),
        );
        assert_eq!(errors, vec!["The incident date cannot be in the future"]);
    }

    #[test]
    fn date_outside_policy_window_rejected() {
        let mut draft = ClaimDraft::new(None, None);
        draft.incident.loss_type = Some(LossType::Glass);
        draft.incident.date = Some(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        draft.incident.location_raw = Some("5th and Main, Springfield".into());
        draft.incident.description = Some("a rock cracked the windshield on the highway".into());

        let snapshot = PolicySnapshot {
            policy_id: "pol-1".into(),
            policy_number: "AUTO-0001".into(),
            product_line: ProductLine::Auto,
            effective_window: EffectiveWindow {
                start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            },
        };
        let errors = validate_state(
            FnolState::IncidentCore,
            &draft,
            ProductLine::Auto,
            Some(&snapshot),
            today(),
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("coverage period"));
    }

    #[test]
    fn home_claims_skip_vehicle_rules() {
        let draft = ClaimDraft::new(None, None);
        let errors = validate_state(
            FnolState::VehicleDriver,
            &draft,
            ProductLine::Home,
            None,
            today(),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn injury_severity_requires_treatment_answer() {
        let mut draft = ClaimDraft::new(None, None);
        draft.injuries.reported_severity = Some(InjurySeverity::Minor);
        let errors = validate_injuries(&draft);
        assert_eq!(errors.len(), 1);

        draft.injuries.treatment = Some(crate::draft::TreatmentLevel::Onsite);
        assert!(validate_injuries(&draft).is_empty());
    }
}
