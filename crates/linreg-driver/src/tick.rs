// SPDX-License-Identifier: AGPL-3.0-only

//! Tick counting and elapsed-time estimation
//!
//! A periodic timer delivers one tick per period to a handler that does
//! nothing but increment a shared counter. The control thread zeroes the
//! counter with `tic()` before a run and reads it with `toc()` after.
//!
//! ```text
//! timer ──tick──▶ TickCounter (AtomicU64) ◀──tic/toc── control thread
//! ```
//!
//! The counter is the only state shared between the two contexts.

use crate::error::{LinregError, Result};
use linreg_isa::timer::{NS_PER_CYCLE, PERIOD_CYCLES};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timer period description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Clock cycles between ticks
    pub period_cycles: u64,

    /// Nanoseconds per clock cycle
    pub ns_per_cycle: u64,
}

impl TimerConfig {
    /// Physical duration of one tick, saturating at `u64::MAX` ns.
    pub const fn tick_period(&self) -> Duration {
        Duration::from_nanos(self.period_cycles.saturating_mul(self.ns_per_cycle))
    }

    /// Elapsed estimate for `ticks` ticks.
    pub fn elapsed(&self, ticks: u64) -> ElapsedEstimate {
        u128::from(ticks)
            .checked_mul(u128::from(self.period_cycles))
            .and_then(|c| c.checked_mul(u128::from(self.ns_per_cycle)))
            .and_then(|ns| u64::try_from(ns).ok())
            .map_or(ElapsedEstimate::Overflow { ticks }, |nanos| {
                ElapsedEstimate::Nanos { ticks, nanos }
            })
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            period_cycles: PERIOD_CYCLES,
            ns_per_cycle: NS_PER_CYCLE,
        }
    }
}

/// Elapsed time estimate, quantized to the tick period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElapsedEstimate {
    /// Estimate fits in 64-bit nanoseconds
    Nanos {
        /// Ticks counted
        ticks: u64,
        /// `ticks × period_cycles × ns_per_cycle`
        nanos: u64,
    },

    /// Estimate exceeds 64-bit nanoseconds
    Overflow {
        /// Ticks counted
        ticks: u64,
    },
}

impl ElapsedEstimate {
    /// Ticks the estimate was computed from
    pub const fn ticks(&self) -> u64 {
        match self {
            Self::Nanos { ticks, .. } | Self::Overflow { ticks } => *ticks,
        }
    }

    /// Nanoseconds, unless the estimate overflowed
    pub const fn nanos(&self) -> Option<u64> {
        match self {
            Self::Nanos { nanos, .. } => Some(*nanos),
            Self::Overflow { .. } => None,
        }
    }

    /// As a `Duration`, unless the estimate overflowed
    pub fn as_duration(&self) -> Option<Duration> {
        self.nanos().map(Duration::from_nanos)
    }
}

impl std::fmt::Display for ElapsedEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nanos { ticks, nanos } => write!(f, "{nanos} ns ({ticks} ticks)"),
            Self::Overflow { ticks } => write!(f, "overflow ({ticks} ticks)"),
        }
    }
}

/// Shared tick counter
///
/// Cloning shares the counter: hand one clone to the tick source and keep
/// another for `tic()`/`toc()`.
#[derive(Debug, Clone, Default)]
pub struct TickCounter {
    ticks: Arc<AtomicU64>,
    timer: TimerConfig,
}

impl TickCounter {
    /// Counter for a timer with the given period
    pub fn new(timer: TimerConfig) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            timer,
        }
    }

    /// Tick handler body: increment by one
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Start a measurement window: zero the count
    pub fn tic(&self) {
        let previous = self.ticks.swap(0, Ordering::AcqRel);
        debug!("tic (discarded {previous} ticks)");
    }

    /// End a measurement window: estimate elapsed time from the count
    pub fn toc(&self) -> ElapsedEstimate {
        let estimate = self.timer.elapsed(self.ticks());
        debug!("toc: {estimate}");
        estimate
    }

    /// Current count
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Timer period this counter converts with
    pub const fn timer(&self) -> &TimerConfig {
        &self.timer
    }
}

/// Periodic event source driving a `TickCounter`
pub trait TickSource {
    /// Register the counter incremented once per period
    fn register(&mut self, counter: TickCounter);

    /// Start delivering ticks
    ///
    /// # Errors
    ///
    /// Returns error if no counter is registered or the source cannot start.
    fn enable(&mut self) -> Result<()>;

    /// Stop delivering ticks
    fn disable(&mut self);
}

/// Tick source backed by a sleeping thread, one tick per physical period
#[derive(Debug)]
pub struct ThreadTicker {
    period: Duration,
    counter: Option<TickCounter>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTicker {
    /// Ticker firing once per `timer.tick_period()`
    pub fn new(timer: &TimerConfig) -> Self {
        Self::with_period(timer.tick_period())
    }

    /// Ticker firing once per `period`
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            counter: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// True while the ticking thread runs
    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

impl TickSource for ThreadTicker {
    fn register(&mut self, counter: TickCounter) {
        self.counter = Some(counter);
    }

    fn enable(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let counter = self
            .counter
            .clone()
            .ok_or_else(|| LinregError::invalid_config("no tick counter registered"))?;
        if self.period.is_zero() {
            return Err(LinregError::invalid_config("tick period is zero"));
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let period = self.period;
        let handle = std::thread::Builder::new()
            .name("linreg-ticker".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    std::thread::sleep(period);
                    counter.tick();
                }
            })?;

        info!("Tick source enabled, period {period:?}");
        self.handle = Some(handle);
        Ok(())
    }

    fn disable(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => info!("Tick source disabled"),
                Err(_) => warn!("Tick source thread panicked"),
            }
        }
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Tick source fired by hand (tests, replay of recorded tick counts)
#[derive(Debug, Default)]
pub struct ManualTicker {
    counter: Option<TickCounter>,
    enabled: bool,
}

impl ManualTicker {
    /// Disabled ticker with no counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `count` ticks; ignored while disabled
    pub fn fire(&self, count: u64) {
        if !self.enabled {
            return;
        }
        if let Some(counter) = &self.counter {
            for _ in 0..count {
                counter.tick();
            }
        }
    }
}

impl TickSource for ManualTicker {
    fn register(&mut self, counter: TickCounter) {
        self.counter = Some(counter);
    }

    fn enable(&mut self) -> Result<()> {
        if self.counter.is_none() {
            return Err(LinregError::invalid_config("no tick counter registered"));
        }
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) {
        self.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (ManualTicker, TickCounter) {
        let counter = TickCounter::new(TimerConfig::default());
        let mut ticker = ManualTicker::new();
        ticker.register(counter.clone());
        ticker.enable().unwrap();
        (ticker, counter)
    }

    #[test]
    fn toc_is_exact_product() {
        let (ticker, counter) = manual();
        counter.tic();
        ticker.fire(37);
        let elapsed = counter.toc();
        assert_eq!(elapsed.ticks(), 37);
        assert_eq!(elapsed.nanos(), Some(37 * 100_000 * 50));
        assert_eq!(elapsed.as_duration(), Some(Duration::from_millis(185)));
    }

    #[test]
    fn tic_zeroes_accumulated_count() {
        let (ticker, counter) = manual();
        ticker.fire(12);
        assert_eq!(counter.ticks(), 12);
        counter.tic();
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.toc().nanos(), Some(0));
    }

    #[test]
    fn disabled_source_delivers_nothing() {
        let (mut ticker, counter) = manual();
        ticker.disable();
        ticker.fire(5);
        assert_eq!(counter.ticks(), 0);
    }

    #[test]
    fn enable_requires_counter() {
        assert!(ManualTicker::new().enable().is_err());
        assert!(ThreadTicker::with_period(Duration::from_millis(1)).enable().is_err());
    }

    #[test]
    fn overflow_is_marked() {
        let timer = TimerConfig::default();
        assert_eq!(
            timer.elapsed(u64::MAX),
            ElapsedEstimate::Overflow { ticks: u64::MAX }
        );
        // Largest tick count still representable
        let max_ticks = u64::MAX / (PERIOD_CYCLES * NS_PER_CYCLE);
        assert!(timer.elapsed(max_ticks).nanos().is_some());
        assert!(timer.elapsed(max_ticks + 1).nanos().is_none());
    }

    #[test]
    fn thread_ticker_counts() {
        let counter = TickCounter::new(TimerConfig::default());
        let mut ticker = ThreadTicker::with_period(Duration::from_millis(1));
        ticker.register(counter.clone());
        ticker.enable().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        ticker.disable();
        let ticks = counter.ticks();
        assert!(ticks > 0);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.ticks(), ticks, "no ticks after disable");
    }

    #[test]
    fn disable_survives_panicked_thread() {
        let mut ticker = ThreadTicker::with_period(Duration::from_millis(1));
        ticker.register(TickCounter::new(TimerConfig::default()));
        ticker.running.store(true, Ordering::Release);
        ticker.handle = Some(std::thread::spawn(|| panic!("tick thread failed")));
        assert!(ticker.is_enabled());

        ticker.disable();
        assert!(!ticker.is_enabled());
        assert!(!ticker.running.load(Ordering::Acquire));
        // Re-enabling after a lost thread starts a fresh one
        ticker.enable().unwrap();
        assert!(ticker.is_enabled());
        ticker.disable();
    }
}
