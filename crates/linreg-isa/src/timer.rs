// SPDX-License-Identifier: AGPL-3.0-only

//! Timer constants for elapsed-time estimation.
//!
//! The platform timer raises one tick every `PERIOD_CYCLES` clock cycles.
//! With a 20 MHz clock (50 ns per cycle) that is one tick every 5 ms.
//!
//! ```text
//! elapsed_ns = ticks × PERIOD_CYCLES × NS_PER_CYCLE
//! ```

/// Clock cycles between two ticks in the observed configuration.
pub const PERIOD_CYCLES: u64 = 100_000;

/// Nanoseconds per clock cycle in the observed configuration.
pub const NS_PER_CYCLE: u64 = 50;

/// Nanoseconds represented by one tick.
pub const NS_PER_TICK: u64 = PERIOD_CYCLES * NS_PER_CYCLE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_five_milliseconds() {
        assert_eq!(NS_PER_TICK, 5_000_000);
    }
}
