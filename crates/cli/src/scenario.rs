use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context as _, bail};
use serde::Serialize;
use tether_core::worker;
use tether_core::{Context, ContextError};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::config::DemoCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Values,
    Cancel,
    Timeout,
    Deadline,
    Leak,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Self::Values,
        Self::Cancel,
        Self::Timeout,
        Self::Deadline,
        Self::Leak,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Values => "values",
            Self::Cancel => "cancel",
            Self::Timeout => "timeout",
            Self::Deadline => "deadline",
            Self::Leak => "leak",
        }
    }

    /// Run against `root`. Returns a report; `Err` only when the run itself was
    /// interrupted, e.g. by shutdown.
    pub async fn run(self, root: &Context, cfg: &DemoCfg) -> anyhow::Result<Report> {
        let started = Instant::now();
        let mut report = match self {
            Self::Values => values(root),
            Self::Cancel => cancel(root, cfg).await?,
            Self::Timeout => timeout(root, cfg).await?,
            Self::Deadline => deadline(root, cfg),
            Self::Leak => leak(cfg).await?,
        };
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(report)
    }
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sc| sc.name() == s)
            .with_context(|| format!("unknown scenario `{s}`"))
    }
}

/// Outcome of one scenario.
#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: &'static str,
    pub context: String,
    pub received: Vec<u64>,
    pub tasks_before: usize,
    pub tasks_after: usize,
    pub err: Option<String>,
    pub elapsed_ms: u64,
    pub passed: bool,
}

impl Report {
    fn new(scenario: Scenario, ctx: &Context) -> Self {
        Self {
            scenario: scenario.name(),
            context: ctx.to_string(),
            received: Vec::new(),
            tasks_before: 0,
            tasks_after: 0,
            err: ctx.err().map(|e| e.to_string()),
            elapsed_ms: 0,
            passed: false,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<8} {} received={:?} tasks={}->{} err={} ({}ms)",
            if self.passed { "ok" } else { "FAIL" },
            self.scenario,
            self.context,
            self.received,
            self.tasks_before,
            self.tasks_after,
            self.err.as_deref().unwrap_or("-"),
            self.elapsed_ms,
        )
    }
}

fn values(root: &Context) -> Report {
    let ctx = root.with_value("user", "alice");

    let b = root.with_value("b", "B");
    let c = root.with_value("c", "C");
    let f = c.with_value("f", "F");

    let passed = ctx.value::<_, &str>(&"user") == Some(&"alice")
        && root.value::<_, &str>(&"user").is_none()
        && f.value::<_, &str>(&"c") == Some(&"C")
        && f.value::<_, &str>(&"b").is_none()
        && b.value::<_, &str>(&"f").is_none();
    tracing::info!(context = %f, "value lookups resolved");

    Report {
        passed,
        ..Report::new(Scenario::Values, &ctx)
    }
}

async fn cancel(root: &Context, cfg: &DemoCfg) -> anyhow::Result<Report> {
    let tracker = TaskTracker::new();
    let tasks_before = tracker.len();

    let (ctx, cancel) = root.with_cancel();
    let mut rx = worker::counter(&ctx, &tracker, cfg.pace());

    let mut received = Vec::with_capacity(cfg.cancel_after);
    while received.len() < cfg.cancel_after {
        match rx.recv().await {
            Some(n) => received.push(n),
            None => bail!("counter ended early: {}", interrupted(&ctx)),
        }
    }
    cancel.cancel();
    tracing::info!(read = received.len(), "cancel sent");

    let tasks_after = drain_and_wait(&mut rx, &tracker, cfg.grace()).await;
    let passed = tasks_after == tasks_before && ctx.err() == Some(ContextError::Canceled);

    Ok(Report {
        received,
        tasks_before,
        tasks_after,
        passed,
        ..Report::new(Scenario::Cancel, &ctx)
    })
}

async fn timeout(root: &Context, cfg: &DemoCfg) -> anyhow::Result<Report> {
    let tracker = TaskTracker::new();
    let tasks_before = tracker.len();

    let (ctx, cancel) = root.with_timeout(cfg.timeout());
    let _release = cancel.drop_guard();
    let mut rx = worker::counter(&ctx, &tracker, cfg.pace());

    let mut received = Vec::new();
    let drained = tokio::time::timeout(cfg.timeout() + cfg.grace(), async {
        while let Some(n) = rx.recv().await {
            received.push(n);
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("counter outlived its deadline");
    }
    if ctx.err() == Some(ContextError::Canceled) {
        bail!("timeout scenario interrupted: {}", interrupted(&ctx));
    }

    let tasks_after = drain_and_wait(&mut rx, &tracker, cfg.grace()).await;
    let passed = drained.is_ok()
        && tasks_after == tasks_before
        && ctx.err() == Some(ContextError::DeadlineExceeded);

    Ok(Report {
        received,
        tasks_before,
        tasks_after,
        passed,
        ..Report::new(Scenario::Timeout, &ctx)
    })
}

fn deadline(root: &Context, cfg: &DemoCfg) -> Report {
    let at = Instant::now()
        .checked_sub(cfg.past_deadline())
        .unwrap_or_else(Instant::now);
    let (ctx, _cancel) = root.with_deadline(at);
    let passed = ctx.is_cancelled();

    Report {
        passed,
        ..Report::new(Scenario::Deadline, &ctx)
    }
}

/// Producer without a context: abandoning the stream without dropping it keeps
/// the task alive; only dropping the receiver releases it.
async fn leak(cfg: &DemoCfg) -> anyhow::Result<Report> {
    let tracker = TaskTracker::new();
    let tasks_before = tracker.len();
    let mut rx = worker::counter_leaky(&tracker);

    let mut received = Vec::with_capacity(cfg.leak_reads);
    while received.len() < cfg.leak_reads {
        received.push(rx.recv().await.context("leaky counter ended early")?);
    }

    tokio::time::sleep(cfg.pace()).await;
    let leaked = tracker.len();
    tracing::warn!(live_tasks = leaked, "producer still running after consumer stopped reading");

    drop(rx);
    tracker.close();
    if tokio::time::timeout(cfg.grace(), tracker.wait()).await.is_err() {
        tracing::warn!("leaky counter did not exit after its receiver was dropped");
    }
    let tasks_after = tracker.len();

    Ok(Report {
        received,
        tasks_before,
        tasks_after,
        passed: leaked == tasks_before + 1 && tasks_after == tasks_before,
        ..Report::new(Scenario::Leak, &Context::background())
    })
}

/// Drain what the worker still had buffered, then wait for it to exit.
/// Returns the live task count afterwards.
async fn drain_and_wait(
    rx: &mut mpsc::Receiver<u64>,
    tracker: &TaskTracker,
    grace: Duration,
) -> usize {
    let released = tokio::time::timeout(grace, async { while rx.recv().await.is_some() {} }).await;
    if released.is_err() {
        tracing::warn!(?grace, "worker kept its output channel open after cancel");
    }
    tracker.close();
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        tracing::warn!(live_tasks = tracker.len(), "worker did not exit within grace period");
    }
    tracker.len()
}

fn interrupted(ctx: &Context) -> String {
    ctx.err()
        .map_or_else(|| "stream closed".to_string(), |e: ContextError| e.to_string())
}
