mod cancel;
mod done;
mod node;
mod timer;
mod value;

pub use cancel::{CancelGuard, CancelHandle};
pub use done::Done;
pub use node::Context;
