// src/core/task.rs

//! The plugin contract implemented by every concrete protocol.
//!
//! A `Task` never touches the transport directly. It receives the bytes of one
//! read at a time and reacts through the capability surface exposed by
//! [`ConnectionContext`], returning the [`Action`] the connection should take next.

use super::errors::SpindleError;
use crate::connection::ConnectionContext;
use tracing::warn;

/// The next step a connection's cycle will take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Wait for inbound bytes.
    Read,
    /// Run post-processing without consuming new bytes.
    Process,
}

/// Protocol-specific logic driven by a connection.
///
/// One instance exists per connection and is only ever called from that
/// connection's own cycle, so implementations need no internal locking.
pub trait Task: Send + 'static {
    /// Server-wide state shared read-only by every connection.
    type State: Send + Sync + 'static;

    /// The first action, chosen once when the connection starts.
    fn initial_action(&self) -> Action {
        Action::Read
    }

    /// Interprets one received chunk. `buffer` is never empty and never longer
    /// than the configured read buffer capacity.
    ///
    /// Returning `Err` marks the input as malformed: `parse_error` is invoked
    /// and the cycle continues with a read.
    fn parse(
        &mut self,
        conn: &mut ConnectionContext<Self::State>,
        buffer: &[u8],
    ) -> Result<Action, SpindleError>;

    /// Reacts to input that `parse` rejected.
    fn parse_error(&mut self, conn: &mut ConnectionContext<Self::State>, error: &SpindleError) {
        warn!(
            "Session {}: parse error: {}",
            conn.handle().session_id(),
            error
        );
    }

    /// Post-processing step run when the current action is `Process`.
    fn process(&mut self, _conn: &mut ConnectionContext<Self::State>) {}
}
