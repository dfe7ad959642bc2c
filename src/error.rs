/// Errors from the bounded operations of the engine.
///
/// None of these are fatal. Callers log them and skip the attempted
/// operation for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The shared radar state stayed locked past the caller's deadline.
    #[error("radar state lock not acquired within {0} ms")]
    LockTimeout(u64),
    /// No sample was published within the consumer's wait.
    #[error("no radar sample within {0} ms")]
    QueueTimeout(u64),
    /// A message did not fit the output buffer.
    #[error("message serialization failed")]
    Serialize,
}

pub type Result<T> = core::result::Result<T, Error>;
