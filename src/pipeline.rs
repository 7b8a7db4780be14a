//! Per-stage status record shown to the user and the cosmetic progress
//! simulator that animates it while the text call is in flight.

use crate::models::{AgentStage, AgentStatus, StageStatus};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Stages covered by the single text-generation call.
pub const TEXT_PHASE: [AgentStage; 3] = [AgentStage::Redator, AgentStage::Designer, AgentStage::Developer];

#[derive(Debug, Clone, PartialEq)]
pub struct StatusBoard {
    statuses: Vec<AgentStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::pending()
    }
}

impl StatusBoard {
    pub fn pending() -> Self {
        let statuses = AgentStage::ALL
            .iter()
            .map(|&stage| AgentStatus {
                stage,
                name: stage.display_name().to_string(),
                status: StageStatus::Pending,
            })
            .collect();
        Self { statuses }
    }

    pub fn statuses(&self) -> &[AgentStatus] {
        &self.statuses
    }

    pub fn status_of(&self, stage: AgentStage) -> StageStatus {
        self.statuses
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.status)
            .unwrap_or(StageStatus::Pending)
    }

    /// Applies a transition if the state machine allows it.
    fn transition(&mut self, stage: AgentStage, next: StageStatus) -> bool {
        match self.statuses.iter_mut().find(|s| s.stage == stage) {
            Some(entry) if entry.status.can_become(next) => {
                entry.status = next;
                true
            }
            Some(entry) => {
                debug!(?stage, from = entry.status.as_str(), to = next.as_str(), "ignored stage transition");
                false
            }
            None => false,
        }
    }

    pub fn start(&mut self, stage: AgentStage) -> bool {
        self.transition(stage, StageStatus::Processing)
    }

    pub fn complete(&mut self, stage: AgentStage) -> bool {
        self.transition(stage, StageStatus::Completed)
    }

    pub fn complete_all(&mut self, stages: &[AgentStage]) {
        for &stage in stages {
            self.complete(stage);
        }
    }

    pub fn processing_stage(&self) -> Option<AgentStage> {
        self.statuses
            .iter()
            .find(|s| s.status == StageStatus::Processing)
            .map(|s| s.stage)
    }

    /// Flags the stage that is processing right now (Redator if none) as failed.
    pub fn fail_current(&mut self) -> AgentStage {
        let stage = self.processing_stage().unwrap_or(AgentStage::Redator);
        self.transition(stage, StageStatus::Error);
        stage
    }

    /// One simulator step: `from` completes and `to` starts, only if both are
    /// still where the simulator left them.
    pub fn advance(&mut self, from: AgentStage, to: AgentStage) -> bool {
        if self.status_of(from) != StageStatus::Processing || self.status_of(to) != StageStatus::Pending {
            return false;
        }
        self.complete(from) && self.start(to)
    }

    pub fn is_complete(&self) -> bool {
        self.statuses.iter().all(|s| s.status == StageStatus::Completed)
    }
}

/// Spawns the timer that walks the text-phase stages forward every `tick`.
///
/// `step` performs one guarded advance and returns false once it no longer
/// applies (run replaced or real result already recorded), which ends the
/// task. The caller aborts the handle when the real result arrives.
pub fn spawn_progress_simulator<F>(tick: Duration, step: F) -> Option<JoinHandle<()>>
where
    F: Fn(AgentStage, AgentStage) -> bool + Send + 'static,
{
    if tick.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        for pair in TEXT_PHASE.windows(2) {
            tokio::time::sleep(tick).await;
            if !step(pair[0], pair[1]) {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn status_list(board: &StatusBoard) -> Vec<StageStatus> {
        board.statuses().iter().map(|s| s.status).collect()
    }

    #[test]
    fn starts_all_pending_with_five_stages() {
        let board = StatusBoard::pending();
        assert_eq!(board.statuses().len(), 5);
        assert_eq!(board.statuses()[4].name, "QA Agent");
        assert!(board.statuses().iter().all(|s| s.status == StageStatus::Pending));
        assert_eq!(board.processing_stage(), None);
    }

    #[test]
    fn failure_marks_processing_stage_and_keeps_prior_completions() {
        let mut board = StatusBoard::pending();
        board.start(AgentStage::Redator);
        assert!(board.advance(AgentStage::Redator, AgentStage::Designer));
        assert_eq!(board.fail_current(), AgentStage::Designer);
        use StageStatus::*;
        assert_eq!(status_list(&board), vec![Completed, Error, Pending, Pending, Pending]);
        // Error is terminal.
        assert!(!board.complete(AgentStage::Designer));
    }

    #[test]
    fn failure_without_processing_defaults_to_redator() {
        let mut board = StatusBoard::pending();
        assert_eq!(board.fail_current(), AgentStage::Redator);
        assert_eq!(board.status_of(AgentStage::Redator), StageStatus::Error);
    }

    #[test]
    fn advance_is_a_no_op_after_authoritative_update() {
        let mut board = StatusBoard::pending();
        board.start(AgentStage::Redator);
        board.complete_all(&TEXT_PHASE);
        assert!(!board.advance(AgentStage::Redator, AgentStage::Designer));
        assert!(!board.advance(AgentStage::Designer, AgentStage::Developer));
    }

    #[test]
    fn completes_every_stage() {
        let mut board = StatusBoard::pending();
        board.start(AgentStage::Redator);
        board.complete_all(&AgentStage::ALL);
        assert!(board.is_complete());
    }

    #[tokio::test]
    async fn zero_tick_disables_simulator() {
        assert!(spawn_progress_simulator(Duration::ZERO, |_, _| true).is_none());
    }

    #[tokio::test]
    async fn simulator_walks_text_phase_only() {
        let board = Arc::new(Mutex::new(StatusBoard::pending()));
        board.lock().start(AgentStage::Redator);
        let shared = board.clone();
        let handle = spawn_progress_simulator(Duration::from_millis(5), move |from, to| shared.lock().advance(from, to))
            .expect("simulator enabled");
        handle.await.unwrap();

        use StageStatus::*;
        assert_eq!(status_list(&board.lock()), vec![Completed, Completed, Processing, Pending, Pending]);
    }
}
