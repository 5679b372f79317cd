//! The FNOL session state machine.
//!
//! One `advance` call per conversational turn, operating load-mutate-save
//! against the session store. Sessions are single-writer: a per-thread-id
//! lock rejects a second in-flight turn with `SessionBusy` instead of
//! interleaving. Nothing is saved when an external dependency fails, so a
//! failed turn is always safe to retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dialogue::{self, AnswerEffect};
use crate::draft::{EvidenceItem, EvidenceKind, UploadStatus};
use crate::error::{FnolError, Result};
use crate::evidence::EvidenceStore;
use crate::policy::{Policy, PolicyLedger, PolicySnapshot};
use crate::reconcile::{self, ReconcileConfig, ReconcileDecision};
use crate::session::{
    successor, FnolState, PendingInput, ProductLine, Session, SessionStatus,
};
use crate::storage::SessionStore;
use crate::validation;
use crate::payout;

const EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_EXTERNAL_ATTEMPTS: u32 = 3;
/// Upper bound on auto-transitions per turn; the graph is small, so hitting
/// this means a routing bug rather than a long flow.
const MAX_DRIVE_STEPS: usize = 16;

const ESCALATION_MESSAGE: &str =
    "I'm connecting you with a claims agent who can help you from here. \
     Everything you've shared so far has been saved for them.";

/// One user turn: either a typed answer or an evidence-arrival event. Both
/// go through the same single-writer path.
#[derive(Debug, Clone, Deserialize)]
pub enum TurnInput {
    Message(String),
    Evidence {
        evidence_ref: String,
        kind: EvidenceKind,
        subtype: Option<String>,
    },
}

/// What the caller needs to render the next turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub thread_id: String,
    pub draft_id: Uuid,
    pub current_state: FnolState,
    pub completed_states: Vec<FnolState>,
    pub progress_percent: u8,
    pub prompt: Option<String>,
    pub pending_input: Option<PendingInput>,
    pub validation_errors: Vec<String>,
    pub is_complete: bool,
    pub should_escalate: bool,
    pub escalation_reason: Option<String>,
}

impl TurnResponse {
    pub fn from_session(session: &Session) -> Self {
        Self {
            thread_id: session.thread_id.clone(),
            draft_id: session.draft.draft_id,
            current_state: session.current_state,
            completed_states: session.completed_states.clone(),
            progress_percent: session.progress_percent,
            prompt: session.prompt.clone(),
            pending_input: session.pending_input.clone(),
            validation_errors: session.validation_errors.clone(),
            is_complete: session.status == SessionStatus::Submitted,
            should_escalate: session.status == SessionStatus::Escalated,
            escalation_reason: session.escalation_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub thread_id: String,
    pub draft_id: Uuid,
    pub collected_facts: serde_json::Value,
    pub can_submit: bool,
    pub validation_errors: Vec<String>,
}

pub struct FnolMachine {
    sessions: Arc<dyn SessionStore>,
    policies: Arc<dyn PolicyLedger>,
    evidence: Arc<dyn EvidenceStore>,
    config: ReconcileConfig,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FnolMachine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        policies: Arc<dyn PolicyLedger>,
        evidence: Arc<dyn EvidenceStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            sessions,
            policies,
            evidence,
            config,
            turn_locks: DashMap::new(),
        }
    }

    /// Start a new session. With a known policy id the identity step is
    /// resolved up front and the product line comes from the policy.
    pub async fn create_session(
        &self,
        policy_id: Option<String>,
        user_id: Option<String>,
        product_line: Option<ProductLine>,
    ) -> Result<TurnResponse> {
        let thread_id = Uuid::new_v4().to_string();
        let mut session = Session::new(
            thread_id.clone(),
            product_line.unwrap_or(ProductLine::Auto),
            policy_id.clone(),
            user_id,
        );

        if let Some(policy_id) = policy_id {
            let policy = self
                .with_retry(|| self.policies.get_policy(&policy_id), "policy ledger")
                .await?;
            self.attach_policy(&mut session, &policy);
        }

        self.drive(&mut session).await?;
        self.sessions.save(session.clone()).await?;
        info!(thread_id = %thread_id, "created FNOL session");
        Ok(TurnResponse::from_session(&session))
    }

    /// Process one turn. The only entry point that mutates a session.
    pub async fn advance(&self, thread_id: &str, input: TurnInput) -> Result<TurnResponse> {
        let lock = self.turn_lock(thread_id);
        let _guard = lock
            .try_lock()
            .map_err(|_| FnolError::SessionBusy(thread_id.to_string()))?;

        let mut session = self
            .sessions
            .get(thread_id)
            .await?
            .ok_or_else(|| FnolError::SessionNotFound(thread_id.to_string()))?;
        if session.is_terminal() {
            return Err(FnolError::SessionTerminated(thread_id.to_string()));
        }

        session.validation_errors.clear();
        let today = Utc::now().date_naive();

        match input {
            TurnInput::Message(text) => {
                if !self.apply_message(&mut session, &text, today).await? {
                    // Validation failed: state, draft and completed list are
                    // untouched; only the error list changed.
                    session.updated_at = Utc::now();
                    self.sessions.save(session.clone()).await?;
                    return Ok(TurnResponse::from_session(&session));
                }
            }
            TurnInput::Evidence {
                evidence_ref,
                kind,
                subtype,
            } => {
                self.apply_evidence(&mut session, evidence_ref, kind, subtype)
                    .await?;
            }
        }

        self.drive(&mut session).await?;
        session.updated_at = Utc::now();
        self.sessions.save(session.clone()).await?;
        Ok(TurnResponse::from_session(&session))
    }

    /// Evidence arrival as its own entry point, same shape as `advance`.
    pub async fn attach_evidence(
        &self,
        thread_id: &str,
        evidence_ref: String,
        kind: EvidenceKind,
        subtype: Option<String>,
    ) -> Result<TurnResponse> {
        self.advance(
            thread_id,
            TurnInput::Evidence {
                evidence_ref,
                kind,
                subtype,
            },
        )
        .await
    }

    /// Read-only snapshot. Never mutates, so repeated calls without an
    /// intervening `advance` return identical results.
    pub async fn resume(&self, thread_id: &str) -> Result<TurnResponse> {
        let session = self
            .sessions
            .get(thread_id)
            .await?
            .ok_or_else(|| FnolError::SessionNotFound(thread_id.to_string()))?;
        Ok(TurnResponse::from_session(&session))
    }

    pub async fn get_summary(&self, thread_id: &str) -> Result<SummaryResponse> {
        let session = self
            .sessions
            .get(thread_id)
            .await?
            .ok_or_else(|| FnolError::SessionNotFound(thread_id.to_string()))?;
        let today = Utc::now().date_naive();
        let validation_errors = validation::validate_for_submission(
            &session.draft,
            session.product_line,
            session.policy.as_ref(),
            today,
        );
        let collected_facts = serde_json::to_value(&session.draft)
            .map_err(|e| FnolError::Storage(e.to_string()))?;
        Ok(SummaryResponse {
            thread_id: session.thread_id.clone(),
            draft_id: session.draft.draft_id,
            collected_facts,
            can_submit: validation_errors.is_empty(),
            validation_errors,
        })
    }

    /// Abandon a session. Idempotent; completed or escalated sessions are
    /// past the point of abandonment and are rejected.
    pub async fn abandon(&self, thread_id: &str) -> Result<()> {
        let lock = self.turn_lock(thread_id);
        let _guard = lock
            .try_lock()
            .map_err(|_| FnolError::SessionBusy(thread_id.to_string()))?;

        let mut session = self
            .sessions
            .get(thread_id)
            .await?
            .ok_or_else(|| FnolError::SessionNotFound(thread_id.to_string()))?;
        match session.status {
            SessionStatus::Abandoned => Ok(()),
            SessionStatus::Submitted | SessionStatus::Escalated => {
                Err(FnolError::SessionTerminated(thread_id.to_string()))
            }
            SessionStatus::Active => {
                session.status = SessionStatus::Abandoned;
                session.prompt = None;
                session.pending_input = None;
                session.updated_at = Utc::now();
                self.sessions.save(session).await?;
                info!(thread_id = %thread_id, "session abandoned");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Turn internals
    // -----------------------------------------------------------------------

    fn turn_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let entry = self
            .turn_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Parse and merge a typed answer. Returns `false` when validation
    /// failed and the turn should stop without advancing.
    async fn apply_message(
        &self,
        session: &mut Session,
        text: &str,
        today: NaiveDate,
    ) -> Result<bool> {
        let line = session.product_line;
        let question = match session.reask_field.as_deref() {
            Some(field) => dialogue::question_for_field(field, &session.draft, line),
            None => dialogue::next_question(session.current_state, &session.draft, line),
        };
        let Some(question) = question else {
            session
                .validation_errors
                .push("No input is expected right now".to_string());
            return Ok(false);
        };

        let before = validation::validate_state(
            session.current_state,
            &session.draft,
            line,
            session.policy.as_ref(),
            today,
        );

        let mut draft = session.draft.clone();
        match dialogue::apply_answer(&mut draft, line, question.field, text, today) {
            Err(errors) => {
                session.validation_errors = errors;
                return Ok(false);
            }
            Ok(AnswerEffect::Emergency { reason }) => {
                session.draft = draft;
                self.escalate(session, reason);
                return Ok(true);
            }
            Ok(AnswerEffect::Recorded) => {}
        }

        // State-level rules on the merged candidate. Only violations the
        // answer introduced block the turn; fields not yet collected are
        // still legitimately missing mid-state.
        let after = validation::validate_state(
            session.current_state,
            &draft,
            line,
            session.policy.as_ref(),
            today,
        );
        let introduced: Vec<String> = after
            .into_iter()
            .filter(|e| !before.contains(e))
            .collect();
        if !introduced.is_empty() {
            session.validation_errors = introduced;
            return Ok(false);
        }

        if question.field == "policy_number" {
            self.resolve_policy(session, &mut draft).await?;
        }
        session.draft = draft;
        if session.reask_field.as_deref() == Some(question.field) {
            session.reask_field = None;
        }
        Ok(true)
    }

    /// Record an upload and pull its extracted entities if they're ready.
    async fn apply_evidence(
        &self,
        session: &mut Session,
        evidence_ref: String,
        kind: EvidenceKind,
        subtype: Option<String>,
    ) -> Result<()> {
        let fetched = self
            .with_retry(
                || self.evidence.get_extracted_entities(&evidence_ref),
                "evidence store",
            )
            .await;
        let item = match fetched {
            Ok(entities) => {
                if kind == EvidenceKind::PoliceReport && entities.report_number.is_some() {
                    session.draft.police.contacted = Some(true);
                    session.draft.police.report_number = entities.report_number.clone();
                }
                EvidenceItem {
                    evidence_ref,
                    kind,
                    subtype,
                    upload_status: UploadStatus::Verified,
                    entities: Some(entities),
                }
            }
            Err(FnolError::EvidenceNotReady(_)) => {
                session.validation_errors.push(
                    "Your upload was received and is still being processed".to_string(),
                );
                EvidenceItem {
                    evidence_ref,
                    kind,
                    subtype,
                    upload_status: UploadStatus::Uploaded,
                    entities: None,
                }
            }
            Err(FnolError::EvidenceInvalid(reason)) => {
                warn!(reason = %reason, "evidence rejected");
                session.validation_errors.push(
                    "We couldn't process that upload. Please try uploading it again"
                        .to_string(),
                );
                EvidenceItem {
                    evidence_ref,
                    kind,
                    subtype,
                    upload_status: UploadStatus::Failed,
                    entities: None,
                }
            }
            Err(other) => return Err(other),
        };
        session.draft.evidence.push(item);
        Ok(())
    }

    /// Advance through question prompts and auto states until user input is
    /// needed or a terminal state is reached.
    async fn drive(&self, session: &mut Session) -> Result<()> {
        let today = Utc::now().date_naive();
        for _ in 0..MAX_DRIVE_STEPS {
            match session.current_state {
                FnolState::LossModule => {
                    for tag in dialogue::detect_scenarios(&session.draft) {
                        session.draft.add_scenario(&tag);
                    }
                    session.complete_current();
                    let next = successor(FnolState::LossModule, session.product_line)
                        .expect("LOSS_MODULE has a successor");
                    session.transition_to(next);
                }
                FnolState::Triage => {
                    if !self.run_triage(session, today).await? {
                        return Ok(());
                    }
                }
                FnolState::ClaimCreate => {
                    if !self.run_claim_create(session).await? {
                        return Ok(());
                    }
                }
                FnolState::NextSteps => {
                    session.complete_current();
                    session.status = SessionStatus::Submitted;
                    session.prompt = Some(next_steps_message(session));
                    session.pending_input = None;
                    return Ok(());
                }
                FnolState::HandoffEscalation => {
                    session.prompt = Some(ESCALATION_MESSAGE.to_string());
                    session.pending_input = None;
                    return Ok(());
                }
                state => {
                    let question = match session.reask_field.as_deref() {
                        Some(field) => dialogue::question_for_field(
                            field,
                            &session.draft,
                            session.product_line,
                        ),
                        None => dialogue::next_question(
                            state,
                            &session.draft,
                            session.product_line,
                        ),
                    };
                    match question {
                        Some(q) => {
                            session.prompt = Some(q.prompt);
                            session.pending_input = Some(q.input);
                            return Ok(());
                        }
                        None => {
                            session.complete_current();
                            let next = successor(state, session.product_line)
                                .expect("non-terminal state has a successor");
                            session.transition_to(next);
                        }
                    }
                }
            }
        }
        warn!(thread_id = %session.thread_id, "drive loop hit its step limit");
        Ok(())
    }

    /// Run the reconciliation protocol once. Returns `true` when the drive
    /// loop should keep going.
    async fn run_triage(&self, session: &mut Session, today: NaiveDate) -> Result<bool> {
        let verdict = reconcile::reconcile(&session.draft, &self.config, today).await;
        session.reconcile_reason = Some(verdict.reason.clone());

        match verdict.decision {
            ReconcileDecision::Approve => {
                session.complete_current();
                session.transition_to(FnolState::ClaimCreate);
                Ok(true)
            }
            ReconcileDecision::RequestMoreInfo {
                state,
                field,
                question,
            } => {
                if session.requeried_fields.contains(&field) {
                    self.escalate(
                        session,
                        format!("Discrepancy on {field} unresolved after follow-up"),
                    );
                    return Ok(true);
                }
                session.requeried_fields.push(field.clone());
                // Route back without touching the draft: both conflicting
                // values stay on record for the human trail.
                session.transition_to(state);
                session.validation_errors.push(verdict.reason.clone());
                session.prompt = Some(question);
                session.pending_input =
                    dialogue::question_for_field(&field, &session.draft, session.product_line)
                        .map(|q| q.input);
                session.reask_field = Some(field);
                Ok(false)
            }
            ReconcileDecision::Escalate { reason } => {
                self.escalate(session, reason);
                Ok(true)
            }
        }
    }

    /// Fetch the authoritative policy, compute the payout and assign the
    /// claim number. Returns `true` when the drive loop should keep going.
    async fn run_claim_create(&self, session: &mut Session) -> Result<bool> {
        let Some(snapshot) = session.policy.clone() else {
            self.escalate(
                session,
                "No policy on file; payout cannot be calculated".to_string(),
            );
            return Ok(true);
        };

        let policy = match self
            .with_retry(
                || self.policies.get_policy(&snapshot.policy_id),
                "policy ledger",
            )
            .await
        {
            Ok(policy) => policy,
            Err(FnolError::PolicyNotFound(id)) => {
                self.escalate(session, format!("Policy {id} no longer found in the ledger"));
                return Ok(true);
            }
            Err(other) => return Err(other),
        };

        match payout::calculate(&policy, &session.draft) {
            Ok(breakdown) => {
                info!(
                    thread_id = %session.thread_id,
                    net = %breakdown.net_payout,
                    total_loss = breakdown.is_total_loss,
                    "payout calculated"
                );
                session.draft.payout = Some(breakdown);
                session.draft.claim_number = Some(generate_claim_number());
                session.complete_current();
                session.transition_to(FnolState::NextSteps);
                Ok(true)
            }
            Err(FnolError::PolicyDataIncomplete(detail)) => {
                self.escalate(session, format!("Payout calculation blocked: {detail}"));
                Ok(true)
            }
            Err(other) => Err(other),
        }
    }

    /// Deterministic path to HANDOFF_ESCALATION. The caller-facing message
    /// is generic; the internal reason is preserved for the handoff record.
    fn escalate(&self, session: &mut Session, reason: String) {
        info!(thread_id = %session.thread_id, reason = %reason, "escalating session");
        session.escalation_reason = Some(reason);
        session.transition_to(FnolState::HandoffEscalation);
        session.status = SessionStatus::Escalated;
        session.prompt = Some(ESCALATION_MESSAGE.to_string());
        session.pending_input = None;
    }

    fn attach_policy(&self, session: &mut Session, policy: &Policy) {
        session.policy = Some(PolicySnapshot::from(policy));
        session.draft.policy_id = Some(policy.policy_id.clone());
        session.draft.identity.status = crate::draft::IdentityStatus::Matched;
        session.draft.identity.policy_number = Some(policy.policy_number.clone());
        if session.product_line != policy.product_line {
            session.product_line = policy.product_line;
            session.recompute_progress();
        }
    }

    /// Resolve the typed policy number against the ledger. An unknown number
    /// drops to guest mode rather than blocking the report.
    async fn resolve_policy(
        &self,
        session: &mut Session,
        draft: &mut crate::draft::ClaimDraft,
    ) -> Result<()> {
        let number = draft
            .identity
            .policy_number
            .clone()
            .unwrap_or_default();
        if number.eq_ignore_ascii_case("guest") || dialogue::is_skip(&number) {
            draft.identity.status = crate::draft::IdentityStatus::Guest;
            draft.identity.policy_number = None;
            return Ok(());
        }
        match self
            .with_retry(|| self.policies.get_policy(&number), "policy ledger")
            .await
        {
            Ok(policy) => {
                session.policy = Some(PolicySnapshot::from(&policy));
                draft.policy_id = Some(policy.policy_id.clone());
                draft.identity.status = crate::draft::IdentityStatus::Matched;
                if session.product_line != policy.product_line {
                    session.product_line = policy.product_line;
                    session.recompute_progress();
                }
                Ok(())
            }
            Err(FnolError::PolicyNotFound(_)) => {
                draft.identity.status = crate::draft::IdentityStatus::Guest;
                draft
                    .notes
                    .push(format!("Policy number {number} not found; continuing as guest"));
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Bounded timeout plus bounded retries with backoff for external I/O.
    /// Exhaustion surfaces the last error, or `SystemUnavailable` for
    /// timeouts, with no partial session mutation committed.
    async fn with_retry<T, Fut>(&self, op: impl Fn() -> Fut, label: &str) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_millis(50);
        let mut last: Option<FnolError> = None;
        for attempt in 1..=MAX_EXTERNAL_ATTEMPTS {
            match tokio::time::timeout(EXTERNAL_CALL_TIMEOUT, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_retriable() => return Err(e),
                Ok(Err(e)) => {
                    warn!(label, attempt, error = %e, "retriable external failure");
                    last = Some(e);
                }
                Err(_) => {
                    warn!(label, attempt, "external call timed out");
                    last = Some(FnolError::SystemUnavailable(format!("{label} timed out")));
                }
            }
            if attempt < MAX_EXTERNAL_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        Err(last.unwrap_or_else(|| FnolError::SystemUnavailable(label.to_string())))
    }
}

fn generate_claim_number() -> String {
    let year = Utc::now().format("%Y");
    let sequence = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("FNOL-{year}-{sequence}")
}

fn next_steps_message(session: &Session) -> String {
    let claim_number = session
        .draft
        .claim_number
        .as_deref()
        .unwrap_or("pending");
    match &session.draft.payout {
        Some(payout) => {
            let mut message = format!(
                "Your claim has been submitted. Your claim number is {claim_number}.\n\
                 Estimated payout after your deductible: ${}.",
                payout.net_payout
            );
            if payout.is_total_loss {
                message.push_str(
                    "\nThe damage may amount to a total loss; an adjuster will confirm \
                     the final valuation.",
                );
            }
            message.push_str(
                "\nAn adjuster will contact you within one business day. You can upload \
                 additional photos or documents at any time.",
            );
            message
        }
        None => format!(
            "Your claim has been submitted. Your claim number is {claim_number}. \
             An adjuster will contact you within one business day."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::InMemoryEvidenceStore;
    use crate::policy::InMemoryPolicyLedger;
    use crate::storage::InMemorySessionStore;

    fn machine() -> FnolMachine {
        FnolMachine::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryPolicyLedger::new()),
            Arc::new(InMemoryEvidenceStore::new()),
            ReconcileConfig::default(),
        )
    }

    #[tokio::test]
    async fn create_session_asks_the_safety_question_first() {
        let machine = machine();
        let response = machine.create_session(None, None, None).await.unwrap();
        assert_eq!(response.current_state, FnolState::SafetyCheck);
        assert!(response.prompt.unwrap().contains("safe location"));
        assert_eq!(response.progress_percent, 0);
    }

    #[tokio::test]
    async fn unknown_thread_id_is_not_found() {
        let machine = machine();
        let err = machine
            .advance("missing", TurnInput::Message("hi".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FnolError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_turn_is_rejected_as_busy() {
        let machine = machine();
        let response = machine.create_session(None, None, None).await.unwrap();

        let lock = machine.turn_lock(&response.thread_id);
        let _held = lock.lock().await;

        let err = machine
            .advance(&response.thread_id, TurnInput::Message("yes".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FnolError::SessionBusy(_)));
    }

    #[tokio::test]
    async fn invalid_answer_does_not_advance_anything() {
        let machine = machine();
        let created = machine.create_session(None, None, None).await.unwrap();

        let before = machine.resume(&created.thread_id).await.unwrap();
        let response = machine
            .advance(&created.thread_id, TurnInput::Message("banana".into()))
            .await
            .unwrap();

        assert!(!response.validation_errors.is_empty());
        assert_eq!(response.current_state, before.current_state);
        assert_eq!(response.completed_states, before.completed_states);
        assert_eq!(response.progress_percent, before.progress_percent);
    }

    #[tokio::test]
    async fn unsafe_caller_requesting_help_escalates() {
        let machine = machine();
        let created = machine.create_session(None, None, None).await.unwrap();

        machine
            .advance(&created.thread_id, TurnInput::Message("no".into()))
            .await
            .unwrap();
        let response = machine
            .advance(
                &created.thread_id,
                TurnInput::Message("I need emergency assistance".into()),
            )
            .await
            .unwrap();

        assert_eq!(response.current_state, FnolState::HandoffEscalation);
        assert!(response.should_escalate);
        assert!(response.escalation_reason.is_some());
    }
}
