//! Scoped timing logs for the style-transfer pipeline.
//!
//! A [`TimingGuard`] records when a stage starts and logs the elapsed time when it is
//! dropped. Guards only become active when telemetry has been switched on with
//! [`configure`] and the `adain::telemetry` log target allows the requested level, so
//! leaving them in hot paths costs a couple of atomic loads.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used for every timing entry.
pub const TELEMETRY_TARGET: &str = "adain::telemetry";

static TELEMETRY_ENABLED: AtomicBool = AtomicBool::new(false);
static TELEMETRY_LEVEL: AtomicU8 = AtomicU8::new(0);

/// RAII guard that logs the duration of a pipeline stage when dropped.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Returns `true` when the guard will emit a log entry on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Time elapsed since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the guard without logging and hand back the measured duration.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        log!(
            target: TELEMETRY_TARGET,
            self.level,
            "{} completed in {:.2?}",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Time a stage, logging at `level` when telemetry allows it.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    timing_guard_if(label, level, true)
}

/// Like [`timing_guard`] but with an extra caller-controlled switch.
pub fn timing_guard_if(
    label: impl Into<Cow<'static, str>>,
    level: Level,
    enabled: bool,
) -> TimingGuard {
    let active = enabled && telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Update the global telemetry switch and verbosity threshold.
pub fn configure(enabled: bool, level: LevelFilter) {
    TELEMETRY_ENABLED.store(enabled, Ordering::Relaxed);
    TELEMETRY_LEVEL.store(level as usize as u8, Ordering::Relaxed);
}

pub fn telemetry_enabled() -> bool {
    TELEMETRY_ENABLED.load(Ordering::Relaxed)
}

/// Currently configured telemetry threshold.
pub fn telemetry_level() -> LevelFilter {
    LevelFilter::iter()
        .find(|filter| *filter as usize as u8 == TELEMETRY_LEVEL.load(Ordering::Relaxed))
        .unwrap_or(LevelFilter::Off)
}

/// Whether a guard at `level` would be allowed by the telemetry settings alone.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && level as usize as u8 <= TELEMETRY_LEVEL.load(Ordering::Relaxed)
}
