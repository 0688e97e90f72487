//! Order lifecycle rules.
//!
//! # Purpose
//! Single authority on which status transitions are legal and which note text
//! accompanies a transition. Both storage backends call through here so the
//! rules cannot drift between them.
use crate::model::OrderStatus;

/// Note recorded when an order is completed without caller-supplied text.
pub const DEFAULT_COMPLETION_NOTE: &str = "Data bundle delivered successfully";

/// Whether a status accepts no further transitions.
pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Completed | OrderStatus::Cancelled)
}

/// Whether `from -> to` is a legal transition.
///
/// Pending orders may start processing, complete, or cancel. Processing
/// orders may complete, cancel, or revert to pending. Terminal orders accept
/// nothing, including a repeat of the same terminal status.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::{Cancelled, Completed, Pending, Processing};
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Completed)
            | (Pending, Cancelled)
            | (Processing, Pending)
            | (Processing, Completed)
            | (Processing, Cancelled)
    )
}

/// Note to record for a transition, if any.
///
/// Completing without a note falls back to [`DEFAULT_COMPLETION_NOTE`]; every
/// other transition records the caller's note verbatim. `None` means the
/// existing note is left as it is.
pub fn transition_note(to: OrderStatus, note: Option<String>) -> Option<String> {
    match (to, note) {
        (OrderStatus::Completed, None) => Some(DEFAULT_COMPLETION_NOTE.to_string()),
        (_, note) => note,
    }
}
