//! Error definitions for the dispatch engine

use super::action::ActionId;
use thiserror::Error;

/// Faults raised by the dispatch engine.
///
/// Both variants are programming errors: they are reported once and never
/// retried. Missing data is not an error, see [`crate::input::Value::NoData`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The source returned a value whose shape does not fit the action
    #[error("Action '{action}' is configured as {expected} but the source returned {got}")]
    KindMismatch {
        action: String,
        expected: &'static str,
        got: &'static str,
    },

    /// The handle was not issued by this engine
    #[error("Unknown action handle {0}")]
    UnknownAction(ActionId),
}
