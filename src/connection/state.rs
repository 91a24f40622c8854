//! Connection lifecycle states and the transitions between them.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::message_assembler::MessageKind;

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Waiting for the host name to resolve.
    Resolving,
    /// Waiting for the transport and upgrade handshake.
    Connecting,
    /// Open for messages in both directions.
    Connected,
    /// A close frame has been sent; waiting for the peer's.
    Closing,
    /// The close handshake was abandoned.
    ClosingUnclean,
    /// Both close frames were exchanged.
    ClosedCleanly,
    /// The connection ended without a completed close handshake.
    ClosedUncleanly,
}

impl ConnectionState {
    /// `true` for the two closed states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ClosedCleanly | Self::ClosedUncleanly)
    }

    /// Whether inbound bytes are still processed.
    #[must_use]
    pub const fn is_readable(self) -> bool { matches!(self, Self::Connected | Self::Closing) }

    /// Whether messages may be sent.
    #[must_use]
    pub const fn is_open(self) -> bool { matches!(self, Self::Connected) }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::ClosingUnclean => "closing-unclean",
            Self::ClosedCleanly => "closed-cleanly",
            Self::ClosedUncleanly => "closed-uncleanly",
        };
        f.write_str(name)
    }
}

/// Externally triggered events driving the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Name resolution succeeded.
    Resolved,
    /// Name resolution failed.
    ResolveFailed,
    /// Transport connected and the upgrade completed.
    Connected,
    /// Transport connect failed, timed out or the upgrade was rejected.
    ConnectFailed,
    /// Either side sent the first close frame.
    CloseStarted,
    /// Both close frames have been exchanged.
    CloseCompleted,
    /// The close handshake can no longer complete.
    CloseAbandoned,
    /// The transport failed or was closed.
    TransportLost,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

/// Errors raised when an operation does not fit the connection state.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The event has no transition from the current state.
    #[error("illegal transition: {event} in state {from}")]
    IllegalTransition {
        /// State the connection was in.
        from: ConnectionState,
        /// Rejected event.
        event: LifecycleEvent,
    },

    /// The connection is not open for this operation.
    #[error("connection is {state}")]
    NotOpen {
        /// Current state.
        state: ConnectionState,
    },

    /// A fragmented outbound message is still open.
    #[error("a fragmented {kind} message is in progress")]
    MessageInProgress {
        /// Kind of the open message.
        kind: MessageKind,
    },

    /// No fragmented outbound message is open.
    #[error("no fragmented message in progress")]
    NoMessageInProgress,

    /// Only text and binary messages may be fragmented.
    #[error("{kind} cannot be sent as a fragmented message")]
    NotDataKind {
        /// Requested kind.
        kind: MessageKind,
    },
}

/// Validates lifecycle transitions.
///
/// # Examples
///
/// ```
/// use wsframe::connection::{ConnectionState, LifecycleEvent, StateMachine};
///
/// let mut machine = StateMachine::new();
/// machine.apply(LifecycleEvent::Resolved).expect("resolving -> connecting");
/// assert_eq!(machine.state(), ConnectionState::Connecting);
///
/// let err = machine.apply(LifecycleEvent::CloseCompleted).expect_err("illegal");
/// assert_eq!(machine.state(), ConnectionState::Connecting);
/// # drop(err);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateMachine {
    state: ConnectionState,
}

impl Default for StateMachine {
    fn default() -> Self { Self::new() }
}

impl StateMachine {
    /// Start in [`ConnectionState::Resolving`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ConnectionState::Resolving,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState { self.state }

    /// Target of `event` from `from`, if the transition exists.
    #[must_use]
    pub const fn next(from: ConnectionState, event: LifecycleEvent) -> Option<ConnectionState> {
        use ConnectionState as S;
        use LifecycleEvent as E;

        match (from, event) {
            (S::Resolving, E::Resolved) => Some(S::Connecting),
            (S::Connecting, E::Connected) => Some(S::Connected),
            (S::Connected, E::CloseStarted) => Some(S::Closing),
            (S::Closing, E::CloseCompleted) => Some(S::ClosedCleanly),
            (S::Closing, E::CloseAbandoned) => Some(S::ClosingUnclean),
            (S::Resolving, E::ResolveFailed)
            | (S::Connecting, E::ConnectFailed)
            | (S::Connected | S::ClosingUnclean, E::TransportLost) => Some(S::ClosedUncleanly),
            _ => None,
        }
    }

    /// Whether `event` is legal in the current state.
    #[must_use]
    pub const fn can_apply(&self, event: LifecycleEvent) -> bool {
        Self::next(self.state, event).is_some()
    }

    /// Apply `event`, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] and leaves the state
    /// unchanged when the event has no transition from the current state.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<ConnectionState, StateError> {
        let from = self.state;
        let Some(to) = Self::next(from, event) else {
            return Err(StateError::IllegalTransition { from, event });
        };
        debug!(%from, %to, %event, "connection state changed");
        self.state = to;
        Ok(to)
    }
}
