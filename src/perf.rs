//! Navigation instrumentation.
//!
//! Two outputs, both off by default:
//! - Stage timings (`--perf`): each timed [`Stage`] is reported through
//!   `tracing` as it finishes and accumulated for [`report`].
//! - The navigation log (`--render-debug-log`): a plain-text file with one
//!   numbered line per [`NavEvent`] (session builds, installs, scroll
//!   requests, settles).

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::document::{ElementHandle, TreeId};

static TIMING: AtomicBool = AtomicBool::new(false);
static STAGES: Mutex<[StageTiming; Stage::COUNT]> = Mutex::new([
    StageTiming::empty(Stage::SessionBuild),
    StageTiming::empty(Stage::ViewRender),
]);
static NAV_LOG: LazyLock<Mutex<Option<NavLog>>> = LazyLock::new(|| Mutex::new(None));

/// A timed phase of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Parse, anchor indexing and handler wiring
    SessionBuild,
    /// A whole `DocumentView::render`, including the install into the view
    ViewRender,
}

impl Stage {
    const COUNT: usize = 2;

    pub const fn name(self) -> &'static str {
        match self {
            Self::SessionBuild => "session.build",
            Self::ViewRender => "view.render",
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Accumulated timings of one [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: Stage,
    pub runs: u32,
    pub total: Duration,
    pub slowest: Duration,
}

impl StageTiming {
    const fn empty(stage: Stage) -> Self {
        Self {
            stage,
            runs: 0,
            total: Duration::ZERO,
            slowest: Duration::ZERO,
        }
    }

    fn add(&mut self, elapsed: Duration) {
        self.runs += 1;
        self.total += elapsed;
        self.slowest = self.slowest.max(elapsed);
    }
}

/// Times a [`Stage`] until dropped.
#[derive(Debug)]
pub struct StageTimer {
    stage: Stage,
    start: Instant,
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        if !is_timing() {
            return;
        }
        let elapsed = self.start.elapsed();
        stages()[self.stage.slot()].add(elapsed);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        tracing::info!(target: "markjump::perf", stage = self.stage.name(), "{elapsed_ms:.2} ms");
    }
}

/// One step of document navigation, as written to the navigation log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavEvent {
    SessionBuilt {
        tree: TreeId,
        lines: usize,
        anchors: usize,
        links: usize,
    },
    SessionInstalled {
        version: u64,
        tree: TreeId,
    },
    ViewDisposed,
    ScrollRequested {
        element: ElementHandle,
        target: f64,
    },
    ScrollSettled {
        offset: f64,
    },
}

impl fmt::Display for NavEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionBuilt {
                tree,
                lines,
                anchors,
                links,
            } => write!(
                f,
                "session built tree={tree} lines={lines} anchors={anchors} links={links}"
            ),
            Self::SessionInstalled { version, tree } => {
                write!(f, "session installed version={version} tree={tree}")
            }
            Self::ViewDisposed => f.write_str("view disposed"),
            Self::ScrollRequested { element, target } => {
                write!(f, "scroll requested element={element} target={target:.1}")
            }
            Self::ScrollSettled { offset } => write!(f, "scroll settled offset={offset:.1}"),
        }
    }
}

#[derive(Debug)]
struct NavLog {
    start: Instant,
    next_seq: u64,
    writer: BufWriter<File>,
}

fn stages() -> MutexGuard<'static, [StageTiming; Stage::COUNT]> {
    STAGES.lock().unwrap_or_else(PoisonError::into_inner)
}

fn nav_log() -> MutexGuard<'static, Option<NavLog>> {
    NAV_LOG.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn set_timing(enabled: bool) {
    TIMING.store(enabled, Ordering::Relaxed);
}

pub fn is_timing() -> bool {
    TIMING.load(Ordering::Relaxed)
}

pub fn time(stage: Stage) -> StageTimer {
    StageTimer {
        stage,
        start: Instant::now(),
    }
}

/// Stages that finished at least once while timing was on.
pub fn timings() -> Vec<StageTiming> {
    stages().iter().filter(|t| t.runs > 0).copied().collect()
}

/// Log one summary line per timed stage.
pub fn report() {
    for timing in timings() {
        let mean_ms = timing.total.as_secs_f64() * 1000.0 / f64::from(timing.runs);
        let slowest_ms = timing.slowest.as_secs_f64() * 1000.0;
        tracing::info!(
            target: "markjump::perf",
            stage = timing.stage.name(),
            runs = timing.runs,
            "mean {mean_ms:.2} ms, slowest {slowest_ms:.2} ms"
        );
    }
}

/// Start writing the navigation log to `path`, or stop with `None`.
pub fn set_nav_log(path: Option<&Path>) -> std::io::Result<()> {
    let mut log = nav_log();
    *log = None;
    if let Some(path) = path {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "markjump navigation log")?;
        writer.flush()?;
        *log = Some(NavLog {
            start: Instant::now(),
            next_seq: 1,
            writer,
        });
    }
    Ok(())
}

pub fn is_nav_log_open() -> bool {
    nav_log().is_some()
}

/// Append `event` to the navigation log, if one is open.
pub fn record(event: NavEvent) {
    let mut guard = nav_log();
    let Some(log) = guard.as_mut() else {
        return;
    };
    let elapsed_ms = log.start.elapsed().as_secs_f64() * 1000.0;
    let seq = log.next_seq;
    log.next_seq += 1;
    // write failures only lose diagnostics
    let _ = writeln!(log.writer, "#{seq:<4} [{elapsed_ms:>10.3} ms] {event}");
    let _ = log.writer.flush();
}
