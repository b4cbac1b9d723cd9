//! Turn-taking gate: tracks whether a new submission may be sent.

/// Phase of the current turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn in flight; a submission may be accepted.
    #[default]
    Idle,
    /// A session was selected and the first handshake has not completed yet.
    AwaitingConnection,
    /// A submission was accepted and is being handed to the transport.
    Sending,
    /// A submission was transmitted; awaiting the terminal envelope.
    AwaitingResponse,
}

/// Tracks turn phase plus the busy indicator shown while output is pending.
///
/// Transitions are driven only by connection status changes, submission
/// hand-off, and terminal envelopes. Every method is total: events that do
/// not apply in the current phase leave it unchanged.
#[derive(Debug, Default)]
pub struct TurnState {
    phase: TurnPhase,
    busy: bool,
}

impl TurnState {
    /// Create a gate in the idle phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: TurnPhase::Idle,
            busy: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Whether the busy indicator should be shown.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy
    }

    /// Input affordance: submissions are accepted exactly when the turn is
    /// idle and the connection is live.
    #[must_use]
    pub fn can_submit(&self, connection_live: bool) -> bool {
        connection_live && self.phase == TurnPhase::Idle
    }

    /// A session was (re)selected; its connection is not live yet.
    pub fn session_selected(&mut self) {
        self.phase = TurnPhase::AwaitingConnection;
        self.busy = false;
    }

    /// The first handshake for the selected session completed.
    pub fn connection_live(&mut self) {
        if self.phase == TurnPhase::AwaitingConnection {
            self.phase = TurnPhase::Idle;
        }
    }

    /// A submission passed the gate and is being handed to the transport.
    pub fn submission_accepted(&mut self) {
        self.phase = TurnPhase::Sending;
    }

    /// The submission reached the transport.
    pub fn transmitted(&mut self) {
        self.phase = TurnPhase::AwaitingResponse;
        self.busy = true;
    }

    /// The transport refused the submission; the turn never started.
    pub fn transmit_failed(&mut self) {
        self.phase = TurnPhase::Idle;
        self.busy = false;
    }

    /// Any non-user envelope arrived; the reply is underway.
    pub fn response_observed(&mut self) {
        self.busy = false;
    }

    /// A terminal envelope (`finish` or `error`) ended the turn.
    pub fn turn_ended(&mut self) {
        self.phase = TurnPhase::Idle;
        self.busy = false;
    }

    /// The connection dropped; a turn must never stay stuck across it.
    pub fn connection_lost(&mut self) {
        self.phase = TurnPhase::Idle;
        self.busy = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_cycle_returns_to_idle_on_finish() {
        let mut turn = TurnState::new();
        assert!(turn.can_submit(true));

        turn.submission_accepted();
        assert_eq!(turn.phase(), TurnPhase::Sending);
        turn.transmitted();
        assert_eq!(turn.phase(), TurnPhase::AwaitingResponse);
        assert!(turn.is_busy());
        assert!(!turn.can_submit(true));

        turn.turn_ended();
        assert_eq!(turn.phase(), TurnPhase::Idle);
        assert!(!turn.is_busy());
        assert!(turn.can_submit(true));
    }

    #[test]
    fn error_unblocks_mid_turn() {
        let mut turn = TurnState::new();
        turn.submission_accepted();
        turn.transmitted();

        turn.turn_ended();
        assert!(turn.can_submit(true));
    }

    #[test]
    fn response_observed_clears_busy_but_keeps_turn_open() {
        let mut turn = TurnState::new();
        turn.submission_accepted();
        turn.transmitted();

        turn.response_observed();
        assert!(!turn.is_busy());
        assert_eq!(turn.phase(), TurnPhase::AwaitingResponse);
        assert!(!turn.can_submit(true));
    }

    #[test]
    fn connection_loss_never_leaves_turn_stuck() {
        let mut turn = TurnState::new();
        turn.submission_accepted();
        turn.transmitted();

        turn.connection_lost();
        assert_eq!(turn.phase(), TurnPhase::Idle);
        assert!(!turn.can_submit(false), "still blocked by connection status");
        assert!(turn.can_submit(true));
    }

    #[test]
    fn selection_waits_for_first_handshake() {
        let mut turn = TurnState::new();
        turn.session_selected();
        assert_eq!(turn.phase(), TurnPhase::AwaitingConnection);
        assert!(!turn.can_submit(true));

        turn.connection_live();
        assert_eq!(turn.phase(), TurnPhase::Idle);
        assert!(turn.can_submit(true));
    }

    #[test]
    fn transmit_failure_reopens_the_gate() {
        let mut turn = TurnState::new();
        turn.submission_accepted();
        turn.transmit_failed();
        assert!(turn.can_submit(true));
        assert!(!turn.is_busy());
    }

    #[test]
    fn connection_live_is_ignored_mid_turn() {
        let mut turn = TurnState::new();
        turn.submission_accepted();
        turn.transmitted();

        turn.connection_live();
        assert_eq!(turn.phase(), TurnPhase::AwaitingResponse);
    }
}
