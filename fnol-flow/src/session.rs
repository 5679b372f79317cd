//! Session state: the enumerated FNOL states, the static transition table,
//! per-product-line skip rules and the live conversation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::ClaimDraft;
use crate::policy::PolicySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FnolState {
    SafetyCheck,
    IdentityMatch,
    IncidentCore,
    LossModule,
    VehicleDriver,
    ThirdParties,
    Injuries,
    DamageEvidence,
    Triage,
    ClaimCreate,
    NextSteps,
    HandoffEscalation,
}

impl FnolState {
    pub fn as_str(self) -> &'static str {
        match self {
            FnolState::SafetyCheck => "SAFETY_CHECK",
            FnolState::IdentityMatch => "IDENTITY_MATCH",
            FnolState::IncidentCore => "INCIDENT_CORE",
            FnolState::LossModule => "LOSS_MODULE",
            FnolState::VehicleDriver => "VEHICLE_DRIVER",
            FnolState::ThirdParties => "THIRD_PARTIES",
            FnolState::Injuries => "INJURIES",
            FnolState::DamageEvidence => "DAMAGE_EVIDENCE",
            FnolState::Triage => "TRIAGE",
            FnolState::ClaimCreate => "CLAIM_CREATE",
            FnolState::NextSteps => "NEXT_STEPS",
            FnolState::HandoffEscalation => "HANDOFF_ESCALATION",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FnolState::NextSteps | FnolState::HandoffEscalation)
    }
}

impl std::fmt::Display for FnolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed traversal order used for progress computation. HANDOFF_ESCALATION
/// is a parallel terminal state and never counts toward progress.
pub const STATE_ORDER: [FnolState; 11] = [
    FnolState::SafetyCheck,
    FnolState::IdentityMatch,
    FnolState::IncidentCore,
    FnolState::LossModule,
    FnolState::VehicleDriver,
    FnolState::ThirdParties,
    FnolState::Injuries,
    FnolState::DamageEvidence,
    FnolState::Triage,
    FnolState::ClaimCreate,
    FnolState::NextSteps,
];

/// Valid transitions per state. Every state may additionally transition to
/// HANDOFF_ESCALATION. Keeping this as a static table keeps the full
/// transition graph enumerable and testable.
pub const STATE_TRANSITIONS: [(FnolState, &[FnolState]); 12] = [
    (FnolState::SafetyCheck, &[FnolState::IdentityMatch]),
    (FnolState::IdentityMatch, &[FnolState::IncidentCore]),
    (FnolState::IncidentCore, &[FnolState::LossModule]),
    (
        FnolState::LossModule,
        &[FnolState::VehicleDriver, FnolState::ThirdParties, FnolState::Injuries],
    ),
    (FnolState::VehicleDriver, &[FnolState::ThirdParties]),
    (FnolState::ThirdParties, &[FnolState::Injuries]),
    (FnolState::Injuries, &[FnolState::DamageEvidence]),
    (FnolState::DamageEvidence, &[FnolState::Triage]),
    (
        FnolState::Triage,
        &[FnolState::ClaimCreate, FnolState::IncidentCore, FnolState::DamageEvidence],
    ),
    (FnolState::ClaimCreate, &[FnolState::NextSteps]),
    (FnolState::NextSteps, &[]),
    (FnolState::HandoffEscalation, &[]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductLine {
    Auto,
    Home,
}

impl ProductLine {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductLine::Auto => "auto",
            ProductLine::Home => "home",
        }
    }
}

/// Whether a state is skipped (auto-transitioned through) for a product line.
pub fn is_skipped(state: FnolState, line: ProductLine) -> bool {
    match line {
        ProductLine::Auto => false,
        ProductLine::Home => {
            matches!(state, FnolState::VehicleDriver | FnolState::ThirdParties)
        }
    }
}

/// The states a session of this product line must traverse, in order.
pub fn required_states(line: ProductLine) -> Vec<FnolState> {
    STATE_ORDER
        .iter()
        .copied()
        .filter(|s| !is_skipped(*s, line))
        .collect()
}

/// The forward successor in the traversal order, with product-line skip
/// rules applied. Escalation and triage route-backs are decided by the
/// machine, not here.
pub fn successor(current: FnolState, line: ProductLine) -> Option<FnolState> {
    let idx = STATE_ORDER.iter().position(|s| *s == current)?;
    STATE_ORDER[idx + 1..]
        .iter()
        .copied()
        .find(|s| !is_skipped(*s, line))
}

/// Whether the static table allows `from -> to`.
pub fn can_transition(from: FnolState, to: FnolState) -> bool {
    if to == FnolState::HandoffEscalation {
        return !from.is_terminal();
    }
    STATE_TRANSITIONS
        .iter()
        .find(|(s, _)| *s == from)
        .map(|(_, targets)| targets.contains(&to))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    YesNo,
    Select,
    MultiSelect,
    Date,
    Time,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputOption {
    pub value: String,
    pub label: String,
}

impl InputOption {
    pub fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// The input modality expected next, recomputed on every transition and
/// never carried over stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInput {
    pub kind: InputKind,
    pub options: Vec<InputOption>,
    pub allow_skip: bool,
}

impl PendingInput {
    pub fn text() -> Self {
        Self {
            kind: InputKind::Text,
            options: Vec::new(),
            allow_skip: false,
        }
    }

    pub fn yes_no(options: Vec<InputOption>) -> Self {
        Self {
            kind: InputKind::YesNo,
            options,
            allow_skip: false,
        }
    }

    pub fn select(options: Vec<InputOption>) -> Self {
        Self {
            kind: InputKind::Select,
            options,
            allow_skip: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Submitted,
    Escalated,
    Abandoned,
}

/// The live conversation instance. Exclusively owned by the session store;
/// the machine operates on a load-mutate-save cycle per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub thread_id: String,
    /// Compare-and-swap token, bumped by the store on every save.
    pub version: u64,
    pub status: SessionStatus,
    pub product_line: ProductLine,

    pub current_state: FnolState,
    /// Insertion order equals traversal order; no duplicates.
    pub completed_states: Vec<FnolState>,
    /// Always `100 * completed / required`, never set directly.
    pub progress_percent: u8,

    pub prompt: Option<String>,
    pub pending_input: Option<PendingInput>,
    /// When the reconciliation protocol routes back for a follow-up, the
    /// specific field to re-ask regardless of what is already collected.
    pub reask_field: Option<String>,
    /// Fields already re-queried once; a second discrepancy on the same
    /// field escalates instead of looping.
    pub requeried_fields: Vec<String>,
    pub validation_errors: Vec<String>,
    pub escalation_reason: Option<String>,
    /// Reason string from the last reconciliation verdict, retained for
    /// display; the rest of the verdict is not persisted.
    pub reconcile_reason: Option<String>,

    pub policy: Option<PolicySnapshot>,
    pub draft: ClaimDraft,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        thread_id: String,
        product_line: ProductLine,
        policy_id: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            version: 0,
            status: SessionStatus::Active,
            product_line,
            current_state: FnolState::SafetyCheck,
            completed_states: Vec::new(),
            progress_percent: 0,
            prompt: None,
            pending_input: None,
            reask_field: None,
            requeried_fields: Vec::new(),
            validation_errors: Vec::new(),
            escalation_reason: None,
            reconcile_reason: None,
            policy: None,
            draft: ClaimDraft::new(policy_id, user_id),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SessionStatus::Active
    }

    /// Append the current state to the completed list (no duplicates) and
    /// recompute progress.
    pub fn complete_current(&mut self) {
        if !self.completed_states.contains(&self.current_state) {
            self.completed_states.push(self.current_state);
        }
        self.recompute_progress();
    }

    pub fn transition_to(&mut self, next: FnolState) {
        debug_assert!(can_transition(self.current_state, next));
        self.current_state = next;
    }

    pub fn recompute_progress(&mut self) {
        let required = required_states(self.product_line);
        let completed = self
            .completed_states
            .iter()
            .filter(|s| required.contains(s))
            .count();
        self.progress_percent = ((completed * 100) / required.len()) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_skips_vehicle_and_third_party_states() {
        let required = required_states(ProductLine::Home);
        assert!(!required.contains(&FnolState::VehicleDriver));
        assert!(!required.contains(&FnolState::ThirdParties));
        assert_eq!(required.len(), 9);

        let required = required_states(ProductLine::Auto);
        assert_eq!(required.len(), 11);
    }

    #[test]
    fn successor_applies_skip_rules() {
        assert_eq!(
            successor(FnolState::LossModule, ProductLine::Auto),
            Some(FnolState::VehicleDriver)
        );
        assert_eq!(
            successor(FnolState::LossModule, ProductLine::Home),
            Some(FnolState::Injuries)
        );
        assert_eq!(successor(FnolState::NextSteps, ProductLine::Auto), None);
    }

    #[test]
    fn every_forward_successor_is_in_the_transition_table() {
        for line in [ProductLine::Auto, ProductLine::Home] {
            for state in STATE_ORDER {
                if is_skipped(state, line) || state.is_terminal() {
                    continue;
                }
                if let Some(next) = successor(state, line) {
                    assert!(
                        can_transition(state, next),
                        "{state} -> {next} missing from table"
                    );
                }
            }
        }
    }

    #[test]
    fn escalation_reachable_from_any_non_terminal_state() {
        for state in STATE_ORDER {
            if !state.is_terminal() {
                assert!(can_transition(state, FnolState::HandoffEscalation));
            }
        }
        assert!(!can_transition(
            FnolState::NextSteps,
            FnolState::HandoffEscalation
        ));
    }

    #[test]
    fn progress_is_derived_from_completed_states() {
        let mut session = Session::new("t".into(), ProductLine::Auto, None, None);
        assert_eq!(session.progress_percent, 0);

        session.complete_current();
        assert_eq!(session.progress_percent, 100 / 11);

        // Completing the same state twice does not double-count.
        session.complete_current();
        assert_eq!(session.completed_states.len(), 1);
    }

    #[test]
    fn state_names_serialize_screaming_snake() {
        let json = serde_json::to_string(&FnolState::DamageEvidence).unwrap();
        assert_eq!(json, "\"DAMAGE_EVIDENCE\"");
    }
}
