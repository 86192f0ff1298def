//! Clock module.
//!
//! Both SoC generations run their timer unit from fixed board oscillators, so the clock
//! tree collapses to a pair of constants here. Dynamic frequency scaling of the CPU and
//! AHB/APB domains does not affect the blocks this HAL drives.
use crate::time::Hertz;

/// 24 MHz high-speed oscillator (HOSC).
pub const OSC_24M: Hertz = Hertz::from_raw(24_000_000);

/// 32.768 kHz low-speed oscillator (LOSC).
pub const LOSC: Hertz = Hertz::from_raw(32_768);
