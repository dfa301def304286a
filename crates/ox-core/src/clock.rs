//! Guest time keeping
//!
//! The guest sees a fixed-frequency tick counter and a system time in
//! 100ns intervals, both derived from the host clock and scaled by an
//! adjustable dilation factor. Scaling only stretches time measured
//! after the clock was created; the system time base itself is fixed
//! at creation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Guest tick frequency in Hz. The 360 uses a 50MHz clock.
pub const GUEST_TICK_FREQUENCY: u64 = 50_000_000;

/// 100ns intervals between 1601-01-01 and the unix epoch
const SYSTEM_TIME_EPOCH_DELTA: u64 = 116_444_736_000_000_000;

/// Guest clock for one virtual machine
pub struct GuestClock {
    /// Guest tick frequency in Hz
    tick_frequency: u64,
    /// Guest system time at creation, in 100ns intervals since 1601-01-01
    system_time_base: u64,
    /// Host instant the clock was created at
    host_epoch: Instant,
    /// Time dilation scalar, stored as f64 bits
    time_scalar_bits: AtomicU64,
}

impl GuestClock {
    /// Create a new guest clock with the given time scalar
    pub fn new(time_scalar: f64) -> Self {
        Self {
            tick_frequency: GUEST_TICK_FREQUENCY,
            system_time_base: query_host_system_time(),
            host_epoch: Instant::now(),
            time_scalar_bits: AtomicU64::new(time_scalar.to_bits()),
        }
    }

    /// Guest tick frequency in Hz
    pub fn tick_frequency(&self) -> u64 {
        self.tick_frequency
    }

    /// Guest system time captured when the clock was created
    pub fn system_time_base(&self) -> u64 {
        self.system_time_base
    }

    /// Current time dilation scalar
    pub fn time_scalar(&self) -> f64 {
        f64::from_bits(self.time_scalar_bits.load(Ordering::Acquire))
    }

    /// Adjust the time dilation scalar (1x, 2x, 1/2x, etc)
    pub fn set_time_scalar(&self, scalar: f64) {
        self.time_scalar_bits
            .store(scalar.to_bits(), Ordering::Release);
        tracing::debug!("Guest time scalar set to {}", scalar);
    }

    /// Host seconds elapsed since creation, scaled into guest seconds
    fn scaled_elapsed_secs(&self) -> f64 {
        self.host_epoch.elapsed().as_secs_f64() * self.time_scalar()
    }

    /// Guest ticks elapsed since the clock was created
    pub fn guest_tick_count(&self) -> u64 {
        (self.scaled_elapsed_secs() * self.tick_frequency as f64) as u64
    }

    /// Current guest system time in 100ns intervals since 1601-01-01
    pub fn guest_system_time(&self) -> u64 {
        self.system_time_base + (self.scaled_elapsed_secs() * 10_000_000.0) as u64
    }
}

/// Host wall-clock time in 100ns intervals since 1601-01-01
pub fn query_host_system_time() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    SYSTEM_TIME_EPOCH_DELTA + since_unix.as_nanos() as u64 / 100
}
