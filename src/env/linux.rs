use std::mem::MaybeUninit;

use super::environment::Clock;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// CLOCK_MONOTONIC_RAW in nanoseconds: slower to read than the TSC, but needs no calibration.
#[derive(Copy, Clone, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline(always)]
    fn ticks(&self) -> u64 {
        let mut ts = MaybeUninit::<libc::timespec>::uninit();
        // Cannot fail for a valid clock id and pointer
        let ts = unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, ts.as_mut_ptr());
            ts.assume_init()
        };
        ts.tv_sec as u64 * NANOS_PER_SEC + ts.tv_nsec as u64
    }

    fn hz(&self) -> u64 {
        NANOS_PER_SEC
    }
}

/// The time-stamp counter. Its frequency has to come from whoever calibrated it.
#[cfg(target_arch = "x86_64")]
#[derive(Copy, Clone, Debug)]
pub struct Tsc {
    hz: u64,
}

#[cfg(target_arch = "x86_64")]
impl Tsc {
    pub fn with_frequency(hz: u64) -> Tsc {
        if hz == 0 {
            panic!("TSC frequency must be non-zero");
        }
        Tsc { hz }
    }
}

#[cfg(target_arch = "x86_64")]
impl Clock for Tsc {
    #[inline(always)]
    fn ticks(&self) -> u64 {
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    fn hz(&self) -> u64 {
        self.hz
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock;
        let before = clock.ticks();
        clock.delay(Duration::from_micros(200));
        let after = clock.ticks();
        assert!(after - before >= 200_000);
    }
}
