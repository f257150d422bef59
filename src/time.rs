//! Monotonic time as seen by the driver.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use cortex_m::peripheral::{DCB, DWT};

/// Microsecond instant.
pub type Instant = fugit::TimerInstantU64<1_000_000>;
/// Microsecond duration.
pub type Duration = fugit::TimerDurationU64<1_000_000>;

pub(crate) const ZERO: Duration = Duration::from_ticks(0);

/// Monotonic elapsed-time source.
///
/// Implementations must be callable from both task and interrupt context.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Time passed since `earlier`; zero if the clock reads earlier than that.
    #[inline]
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().checked_duration_since(earlier).unwrap_or(ZERO)
    }

    /// Busy-waits for at least `duration`.
    fn delay(&self, duration: Duration) {
        let start = self.now();
        while self.elapsed_since(start) < duration {
            core::hint::spin_loop();
        }
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Clock backed by the Cortex-M DWT cycle counter.
///
/// The 32-bit counter wraps after a few seconds at typical core clocks, so every reading
/// extends it to 64 bits. `now()` must be called at least once per wrap period for the
/// extension to stay correct.
pub struct DwtClock {
    cycles_per_us: u32,
    last: AtomicU32,
    wraps: AtomicU32,
}

impl DwtClock {
    /// Enables tracing and the cycle counter, then resets it.
    pub fn new(dcb: &mut DCB, dwt: &mut DWT, core_hz: u32) -> Self {
        dcb.enable_trace();
        dwt.set_cycle_count(0);
        dwt.enable_cycle_counter();
        Self {
            cycles_per_us: (core_hz / 1_000_000).max(1),
            last: AtomicU32::new(0),
            wraps: AtomicU32::new(0),
        }
    }

    fn cycles(&self) -> u64 {
        cortex_m::interrupt::free(|_| {
            let now = DWT::cycle_count();
            if now < self.last.load(Ordering::Relaxed) {
                self.wraps.fetch_add(1, Ordering::Relaxed);
            }
            self.last.store(now, Ordering::Relaxed);
            (u64::from(self.wraps.load(Ordering::Relaxed)) << 32) | u64::from(now)
        })
    }
}

impl Clock for DwtClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.cycles() / u64::from(self.cycles_per_us))
    }
}

/// Rate limiter for warnings emitted from polling loops.
///
/// Lets one line through per `interval` and counts the ones held back.
pub struct LogThrottle {
    armed: AtomicBool,
    last_ms: AtomicU32,
    suppressed: AtomicU32,
}

impl LogThrottle {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            last_ms: AtomicU32::new(0),
            suppressed: AtomicU32::new(0),
        }
    }

    /// Returns `Some(suppressed_since_last_line)` when a line may be emitted at `now`.
    pub fn check(&self, now: Instant, interval: Duration) -> Option<u32> {
        let now_ms = millis(now);
        let interval_ms = interval.to_millis().min(u64::from(u32::MAX)) as u32;

        if self.armed.load(Ordering::Acquire) {
            let last = self.last_ms.load(Ordering::Relaxed);
            if now_ms.wrapping_sub(last) < interval_ms
                || self
                    .last_ms
                    .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
                    .is_err()
            {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        } else {
            self.last_ms.store(now_ms, Ordering::Relaxed);
            self.armed.store(true, Ordering::Release);
        }
        Some(self.suppressed.swap(0, Ordering::Relaxed))
    }

    /// Records a line emitted at `now` regardless of the interval. The next window starts
    /// there. Returns the lines suppressed since the previous one.
    pub fn force(&self, now: Instant) -> u32 {
        self.last_ms.store(millis(now), Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
        self.suppressed.swap(0, Ordering::Relaxed)
    }
}

// Millisecond resolution keeps the timestamp in one 32-bit atomic; the wrapping difference
// stays correct for intervals far below 49 days.
#[inline]
fn millis(now: Instant) -> u32 {
    (now.ticks() / 1_000) as u32
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new()
    }
}
