use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use super::cancel::CancelHandle;
use super::done::{self, Done, Link};
use super::timer;
use super::value::Entry;
use crate::error::ContextError;
use crate::signal::Signal;

static BACKGROUND: LazyLock<Context> = LazyLock::new(|| Context::root("context.Background"));
static TODO: LazyLock<Context> = LazyLock::new(|| Context::root("context.TODO"));

/// Immutable carrier of cancellation, deadline and request-scoped values.
///
/// Cloning is cheap and yields the same node. Deriving (`with_value`,
/// `with_cancel`, `with_deadline`, `with_timeout`) always creates a new child and
/// never touches the receiver, so siblings never see each other's additions.
///
/// A context is done once any node on its ancestor chain is closed. That state
/// is resolved at query time by walking parents, nearest first.
#[derive(Clone)]
pub struct Context {
    node: Arc<Node>,
}

struct Node {
    parent: Option<Context>,
    payload: Payload,
}

enum Payload {
    Root(&'static str),
    Value(Entry),
    Cancel(Signal),
    Deadline { signal: Signal, at: Instant },
}

impl Node {
    fn signal(&self) -> Option<&Signal> {
        match &self.payload {
            Payload::Cancel(signal) | Payload::Deadline { signal, .. } => Some(signal),
            Payload::Root(_) | Payload::Value(_) => None,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match self.payload {
            Payload::Deadline { at, .. } => Some(at),
            _ => None,
        }
    }

    fn link(&self) -> Option<Link> {
        self.signal().map(|signal| Link {
            signal: signal.clone(),
            deadline: self.deadline(),
        })
    }
}

// Unlink long chains iteratively so dropping a deep context cannot overflow the
// stack through nested Arc drops.
impl Drop for Node {
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(ctx) = next {
            match Arc::try_unwrap(ctx.node) {
                Ok(mut node) => next = node.parent.take(),
                Err(_) => break,
            }
        }
    }
}

impl Context {
    fn root(name: &'static str) -> Self {
        Self {
            node: Arc::new(Node {
                parent: None,
                payload: Payload::Root(name),
            }),
        }
    }

    fn derive(&self, payload: Payload) -> Self {
        Self {
            node: Arc::new(Node {
                parent: Some(self.clone()),
                payload,
            }),
        }
    }

    /// Process-wide empty root: no values, no deadline, never cancelled.
    pub fn background() -> Self {
        BACKGROUND.clone()
    }

    /// Empty root for call sites that have not yet been given a real context.
    /// Behaves exactly like `background`.
    pub fn todo() -> Self {
        TODO.clone()
    }

    /// Child carrying `key → value`. Creates no signal; cancellation and
    /// deadline queries resolve through the ancestors.
    pub fn with_value<K, V>(&self, key: K, value: V) -> Self
    where
        K: Any + Eq + fmt::Debug + Send + Sync,
        V: Any + Send + Sync,
    {
        self.derive(Payload::Value(Entry::new(key, value)))
    }

    /// Child with its own signal, plus the handle that closes it.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let signal = Signal::new();
        if let Some(reason) = self.err() {
            signal.close_with(reason);
        }
        let ctx = self.derive(Payload::Cancel(signal.clone()));
        (ctx, CancelHandle::new(signal))
    }

    /// Child that is cancelled automatically once `deadline` passes.
    ///
    /// An already elapsed deadline closes the child before it is returned. If an
    /// ancestor's deadline is no later than `deadline`, the child is a plain
    /// cancel node: the ancestor's timer already covers it.
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        if let Some(current) = self.deadline()
            && current <= deadline
        {
            return self.with_cancel();
        }

        let signal = Signal::new();
        if let Some(reason) = self.err() {
            signal.close_with(reason);
        } else if deadline <= Instant::now() {
            tracing::debug!("deadline already elapsed, context canceled");
            signal.close_with(ContextError::DeadlineExceeded);
        } else {
            timer::arm(signal.clone(), deadline);
        }

        let ctx = self.derive(Payload::Deadline {
            signal: signal.clone(),
            at: deadline,
        });
        (ctx, CancelHandle::new(signal))
    }

    /// `with_deadline(now + timeout)`. A timeout too large to represent never
    /// fires.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Value stored under `key` by the nearest ancestor (including self) whose
    /// key matches. `None` if no ancestor matches, or if the nearest match holds
    /// a value of another type.
    pub fn value<K, V>(&self, key: &K) -> Option<&V>
    where
        K: Any + Eq,
        V: Any,
    {
        self.nodes()
            .find_map(|node| match &node.payload {
                Payload::Value(entry) if entry.matches(key) => Some(entry),
                _ => None,
            })
            .and_then(Entry::value::<V>)
    }

    /// Awaitable handle over every signal on the chain.
    pub fn done(&self) -> Done {
        Done::new(self.nodes().filter_map(Node::link).collect())
    }

    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is live.
    pub fn err(&self) -> Option<ContextError> {
        done::reason_of(
            self.nodes()
                .filter_map(|node| node.signal().map(|signal| (signal, node.deadline()))),
        )
    }

    /// Earliest deadline on the chain.
    pub fn deadline(&self) -> Option<Instant> {
        self.nodes().filter_map(Node::deadline).min()
    }

    /// Number of ancestors above this node. Zero for a root.
    pub fn depth(&self) -> usize {
        self.nodes().count() - 1
    }

    /// True if both refer to the same node.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(Some(&*self.node), |node| {
            node.parent.as_ref().map(|p| &*p.node)
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<&Node> = self.nodes().collect();
        for node in chain.into_iter().rev() {
            match &node.payload {
                Payload::Root(name) => f.write_str(name)?,
                Payload::Value(entry) => write!(f, ".WithValue({entry})")?,
                Payload::Cancel(_) => f.write_str(".WithCancel")?,
                Payload::Deadline { at, .. } => write!(
                    f,
                    ".WithDeadline({:?})",
                    at.saturating_duration_since(Instant::now())
                )?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("chain", &format_args!("{self}"))
            .field("err", &self.err())
            .finish()
    }
}
