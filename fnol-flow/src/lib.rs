pub mod dialogue;
pub mod draft;
pub mod error;
pub mod evidence;
pub mod machine;
pub mod payout;
pub mod policy;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod validation;

// Re-export commonly used types
pub use draft::{ClaimDraft, EvidenceKind, InjurySeverity, LossType};
pub use error::{FnolError, Result};
pub use evidence::{EvidenceStore, ExtractedEntities, InMemoryEvidenceStore};
pub use machine::{FnolMachine, SummaryResponse, TurnInput, TurnResponse};
pub use payout::{calculate, PayoutBreakdown};
pub use policy::{
    EffectiveWindow, ExclusionAdjustment, ExclusionPredicate, ExclusionRule, InMemoryPolicyLedger,
    Policy, PolicyLedger,
};
pub use reconcile::{ReconcileConfig, ReconcileDecision, ReconciliationVerdict};
pub use session::{
    FnolState, InputKind, InputOption, PendingInput, ProductLine, Session, SessionStatus,
};
pub use storage::{InMemorySessionStore, PostgresSessionStore, SessionStore};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn machine_wires_up_with_in_memory_adapters() {
        let machine = FnolMachine::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryPolicyLedger::new()),
            Arc::new(InMemoryEvidenceStore::new()),
            ReconcileConfig::default(),
        );

        let created = machine.create_session(None, None, None).await.unwrap();
        assert_eq!(created.current_state, FnolState::SafetyCheck);

        let resumed = machine.resume(&created.thread_id).await.unwrap();
        assert_eq!(resumed.current_state, created.current_state);
        assert_eq!(resumed.draft_id, created.draft_id);
    }
}
