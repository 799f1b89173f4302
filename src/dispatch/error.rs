//! Errors returned when a unit cannot be admitted.

use thiserror::Error;

/// Why [`DispatchQueue::queue`](super::DispatchQueue::queue) refused a unit.
///
/// In both cases the session has already been sent a close frame.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Every slot in the bounded queue was taken.
    #[error("dispatch queue is full")]
    QueueFull,
    /// The queue was shut down.
    #[error("dispatch queue has shut down")]
    ShutDown,
}
