//! # Timer unit register module.
//!
//! The unit contains six down-counting timers behind shared interrupt enable and status
//! registers, an AVS counter pair, the watchdog and a free-running 64-bit counter.
use arbitrary_int::u3;
use static_assertions::const_assert_eq;

pub const TIMER_BASE_ADDR: usize = 0x01C2_0C00;

/// Number of timers in the unit.
pub const NUM_TIMERS: usize = 6;

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerIrqControl {
    #[bit(5, rw)]
    tmr5: bool,
    #[bit(4, rw)]
    tmr4: bool,
    #[bit(3, rw)]
    tmr3: bool,
    #[bit(2, rw)]
    tmr2: bool,
    #[bit(1, rw)]
    tmr1: bool,
    #[bit(0, rw)]
    tmr0: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerIrqStatus {
    #[bit(5, rw)]
    tmr5: bool,
    #[bit(4, rw)]
    tmr4: bool,
    #[bit(3, rw)]
    tmr3: bool,
    #[bit(2, rw)]
    tmr2: bool,
    #[bit(1, rw)]
    tmr1: bool,
    #[bit(0, rw)]
    tmr0: bool,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ClockSource {
    /// 32.768 kHz low-speed oscillator.
    #[default]
    Losc = 0b00,
    /// 24 MHz high-speed oscillator.
    Osc24M = 0b01,
    /// PLL6 output divided by 6.
    Pll6Div6 = 0b10,
    __Reserved = 0b11,
}

#[bitbybit::bitenum(u1, exhaustive = true)]
#[derive(Debug, Default, PartialEq, Eq)]
pub enum CountMode {
    /// Reload from the interval register on underflow and keep counting.
    #[default]
    Continuous = 0b0,
    /// Stop after the first underflow.
    Single = 0b1,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerControl {
    #[bit(7, rw)]
    mode: CountMode,
    /// Prescaler exponent, the source clock is divided by `2^value`.
    #[bits(4..=6, rw)]
    prescale: u3,
    #[bits(2..=3, rw)]
    clk_src: ClockSource,
    /// Write 1 to load the interval value into the counter. Cleared by hardware once
    /// the load is done.
    #[bit(1, rw)]
    reload: bool,
    #[bit(0, rw)]
    enable: bool,
}

/// Timer unit registers.
///
/// Timer 3 is the odd one out: it has no current-value register.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Timer {
    /// Shared interrupt enable register, one bit per timer.
    irq_enable: TimerIrqControl,
    /// Shared interrupt status register. Writing 1 to a bit position clears it.
    #[mmio(PureRead, Write)]
    irq_status: TimerIrqStatus,
    _reserved_0: [u32; 2],
    ctrl_0: TimerControl,
    interval_0: u32,
    value_0: u32,
    _reserved_1: u32,
    ctrl_1: TimerControl,
    interval_1: u32,
    value_1: u32,
    _reserved_2: u32,
    ctrl_2: TimerControl,
    interval_2: u32,
    value_2: u32,
    _reserved_3: u32,
    ctrl_3: TimerControl,
    interval_3: u32,
    _reserved_4: [u32; 2],
    ctrl_4: TimerControl,
    interval_4: u32,
    value_4: u32,
    _reserved_5: u32,
    ctrl_5: TimerControl,
    interval_5: u32,
    value_5: u32,
    _reserved_6: [u32; 5],
    /// AVS counter control.
    avs_ctrl: u32,
    avs_count_0: u32,
    avs_count_1: u32,
    /// Division factors for both AVS counters.
    avs_divisor: u32,
    /// Watchdog restart key register.
    wdog_ctrl: u32,
    /// Watchdog interval and reset configuration.
    wdog_mode: u32,
    _reserved_7: [u32; 2],
    /// Free-running 64-bit counter control.
    cnt64_ctrl: u32,
    #[mmio(PureRead)]
    cnt64_low: u32,
    #[mmio(PureRead)]
    cnt64_high: u32,
}

const_assert_eq!(core::mem::size_of::<Timer>(), 0xAC);

impl Timer {
    /// Create a new timer unit MMIO instance at the fixed base address.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    #[inline]
    pub const unsafe fn new_mmio_fixed() -> MmioTimer<'static> {
        unsafe { Self::new_mmio_at(TIMER_BASE_ADDR) }
    }
}
