//! Context propagation for Tokio tasks: cancellation, deadlines and
//! request-scoped values carried through an immutable tree of contexts.

pub mod context;
pub mod error;
pub mod signal;
pub mod worker;

pub use context::{CancelGuard, CancelHandle, Context, Done};
pub use error::ContextError;
pub use signal::Signal;
