/// Why a context stopped being live.
///
/// This is a state report, not a failure: the context itself keeps working and
/// every query on it stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ContextError {
    /// A cancel handle on the chain was invoked.
    #[error("context canceled")]
    Canceled,
    /// A deadline on the chain elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl ContextError {
    pub fn is_deadline(self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}
