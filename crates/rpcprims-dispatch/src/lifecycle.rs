use std::fmt;

use rpcprims_types::ErrorKind;
use tracing::trace;

/// Where a dispatched request is in its life.
///
/// ```text
/// Received -> Matched -> Validating -> Executing -> Responding -> Completed
///     \          \           \             \
///      `----------`-----------`-------------`--> Failed(kind)
/// ```
///
/// `Failed` from `Received` covers requests that never match a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Received,
    Matched,
    Validating,
    Executing,
    Responding,
    Completed,
    Failed(ErrorKind),
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Matched)
                | (Matched, Validating)
                | (Validating, Executing)
                | (Executing, Responding)
                | (Responding, Completed)
                | (Received | Matched | Validating | Executing, Failed(_))
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Matched => f.write_str("matched"),
            Self::Validating => f.write_str("validating"),
            Self::Executing => f.write_str("executing"),
            Self::Responding => f.write_str("responding"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Recorded state history of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    history: Vec<RequestState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![RequestState::Received],
        }
    }

    pub fn state(&self) -> RequestState {
        self.history
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<RequestState> {
        self.history
    }

    pub(crate) fn advance(&mut self, next: RequestState) {
        let current = self.state();
        debug_assert!(
            current.can_advance_to(next),
            "illegal request transition {current} -> {next}"
        );
        trace!(from = %current, to = %next, "request state");
        self.history.push(next);
    }

    pub(crate) fn fail(&mut self, kind: ErrorKind) {
        self.advance(RequestState::Failed(kind));
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
