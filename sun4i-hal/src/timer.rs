//! # System tick timer driver
//!
//! Drives timer 0 of the sun4i/sun5i timer block as the system tick source. The timer
//! counts down from a programmed interval on the 24 MHz oscillator divided by 16,
//! either continuously for a periodic tick or in single count-down mode for tickless
//! operation with [TickTimer::set_next_event].
//!
//! The driver also exposes the free-running 64-bit counter of the block through
//! [Counter64], which doubles as a blocking [embedded_hal::delay::DelayNs] provider.
use core::cell::RefCell;

use arbitrary_int::u3;
use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use sun4i::timer::{ClockSource, CountMode, MmioTimer, Timer, TimerIrqStatus};

use crate::SocVariant;
use crate::clocks::OSC_24M;
use crate::time::Hertz;

/// Power-of-two exponent of the fixed tick prescaler. The input clock is divided
/// by 16.
pub const TICK_PRESCALE_EXP: u8 = 4;

/// Smallest one-shot interval the hardware reloads reliably.
pub const MIN_ONESHOT_TICKS: u32 = 0x1;
/// Largest one-shot interval accepted by [TickTimer::set_next_event].
pub const MAX_ONESHOT_TICKS: u32 = 0xff;
/// Shortest duration ever reported for a tick count, in nanoseconds.
pub const MIN_DELTA_NS: u64 = 1000;

/// Input clock of the tick timer after the fixed prescaler.
pub const fn timer_input_clk() -> Hertz {
    Hertz::from_raw(OSC_24M.raw() >> TICK_PRESCALE_EXP)
}

/// Operating mode of the tick timer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Timer stopped, no events are generated.
    #[default]
    Disabled,
    /// Auto-reloading interval timer generating the periodic system tick.
    Periodic,
    /// Single count-down armed per event via [TickTimer::set_next_event].
    OneShot,
}

/// Fixed-point scaling between timer ticks and nanoseconds.
///
/// The factor is `clock_rate << 32 / 1e9`, so multiplying a nanosecond value by it and
/// shifting right by 32 yields ticks, and the division goes the other way. This keeps
/// both directions free of 64-bit division at run-time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickConversion {
    mult: u64,
}

impl TickConversion {
    const SHIFT: u32 = 32;

    pub const fn new(timer_clk: Hertz) -> Self {
        Self {
            mult: ((timer_clk.raw() as u64) << Self::SHIFT) / 1_000_000_000,
        }
    }

    #[inline]
    pub const fn mult(&self) -> u64 {
        self.mult
    }

    /// Duration of a tick count in nanoseconds, floored at [MIN_DELTA_NS].
    #[inline]
    pub const fn ticks_to_ns(&self, ticks: u32) -> u64 {
        let ns = ((ticks as u64) << Self::SHIFT) / self.mult;
        if ns < MIN_DELTA_NS { MIN_DELTA_NS } else { ns }
    }

    /// Tick count covering a nanosecond duration.
    #[inline]
    pub const fn ns_to_ticks(&self, ns: u64) -> u32 {
        ((ns * self.mult) >> Self::SHIFT) as u32
    }
}

/// Clock source quality rating, higher is better. The A10 erratum forces a low rating
/// so an OS picks any other available tick source first.
const fn rating_for_variant(variant: SocVariant) -> u16 {
    match variant {
        SocVariant::Sun4i => 100,
        SocVariant::Sun5i => 300,
    }
}

/// Tick callback invoked by [TickTimer::handle_interrupt] after the interrupt was
/// acknowledged. The callback receives the driver itself so it can re-arm the next
/// one-shot event.
pub type TickHandler = fn(&mut TickTimer);

#[derive(Debug, thiserror::Error)]
#[error("tick timer already installed")]
pub struct AlreadyInstalledError;

/// Driver for timer 0 as the system tick source.
pub struct TickTimer {
    regs: MmioTimer<'static>,
    mode: Mode,
    tick_freq: Hertz,
    conversion: TickConversion,
    rating: u16,
    handler: Option<TickHandler>,
}

unsafe impl Send for TickTimer {}

impl TickTimer {
    /// Create the driver and program the static clocking configuration.
    ///
    /// The timer stays disabled, select an operating mode with [Self::set_mode]
    /// afterwards. `tick_freq` is the tick rate used by [Mode::Periodic].
    pub fn new_with_init(regs: MmioTimer<'static>, variant: SocVariant, tick_freq: Hertz) -> Self {
        let mut timer = Self {
            regs,
            mode: Mode::Disabled,
            tick_freq,
            conversion: TickConversion::new(timer_input_clk()),
            rating: rating_for_variant(variant),
            handler: None,
        };
        timer.initialize();
        timer
    }

    /// Program clock source, prescaler, auto-reload and the interrupt enable bit.
    ///
    /// The enable bit of the timer itself stays cleared.
    pub fn initialize(&mut self) {
        self.regs.write_interval_0(self.interval_ticks());
        self.regs.modify_ctrl_0(|mut ctrl| {
            ctrl.set_clk_src(ClockSource::Osc24M);
            ctrl.set_prescale(u3::new(TICK_PRESCALE_EXP));
            ctrl
        });
        self.regs.modify_ctrl_0(|mut ctrl| {
            ctrl.set_reload(true);
            ctrl
        });
        self.regs.modify_irq_enable(|mut enable| {
            enable.set_tmr0(true);
            enable
        });
    }

    /// Interval register value for the configured periodic tick rate.
    #[inline]
    const fn interval_ticks(&self) -> u32 {
        timer_input_clk().raw() / self.tick_freq.raw()
    }

    /// Switch the operating mode.
    ///
    /// Entering [Mode::Periodic] re-programs the interval before starting the timer.
    /// Entering [Mode::OneShot] only selects single count-down mode, the timer starts
    /// with the first [Self::set_next_event]. [Mode::Disabled] stops the count-down but
    /// leaves clocking and interrupt configuration in place.
    pub fn set_mode(&mut self, mode: Mode) {
        match mode {
            Mode::Periodic => {
                log::info!("tick timer: periodic mode at {}", self.tick_freq);
                self.regs.write_interval_0(self.interval_ticks());
                self.regs.modify_ctrl_0(|mut ctrl| {
                    ctrl.set_mode(CountMode::Continuous);
                    ctrl.set_enable(true);
                    ctrl
                });
            }
            Mode::OneShot => {
                log::info!("tick timer: one-shot mode");
                self.regs.modify_ctrl_0(|mut ctrl| {
                    ctrl.set_mode(CountMode::Single);
                    ctrl
                });
            }
            Mode::Disabled => {
                self.regs.modify_ctrl_0(|mut ctrl| {
                    ctrl.set_enable(false);
                    ctrl
                });
            }
        }
        self.mode = mode;
    }

    /// Arm the next one-shot event, `delta` ticks from now.
    ///
    /// `delta` must lie within `[MIN_ONESHOT_TICKS, MAX_ONESHOT_TICKS]`. The control
    /// register is read once up front so the sequence stays safe when called from the
    /// tick callback while the last event is still being handled: the current value is
    /// written, the pending value latched with the reload strobe, then the count-down
    /// started.
    pub fn set_next_event(&mut self, delta: u32) {
        debug_assert!((MIN_ONESHOT_TICKS..=MAX_ONESHOT_TICKS).contains(&delta));
        let ctrl = self.regs.read_ctrl_0();
        self.regs.write_value_0(delta);
        let ctrl = ctrl.with_reload(true);
        self.regs.write_ctrl_0(ctrl);
        self.regs.write_ctrl_0(ctrl.with_enable(true));
    }

    /// Interrupt service routine of the tick timer.
    ///
    /// Acknowledges the expired event by writing only the timer 0 bit into the
    /// write-1-to-clear status register and then invokes the tick callback.
    pub fn handle_interrupt(&mut self) {
        let mut ack = TimerIrqStatus::DEFAULT;
        ack.set_tmr0(true);
        self.regs.write_irq_status(ack);
        if let Some(handler) = self.handler {
            handler(self);
        }
    }

    /// Register the callback invoked by [Self::handle_interrupt].
    pub fn set_tick_handler(&mut self, handler: TickHandler) {
        self.handler = Some(handler);
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Clock source quality rating of this timer on the configured SoC variant.
    #[inline]
    pub fn rating(&self) -> u16 {
        self.rating
    }

    #[inline]
    pub fn tick_freq(&self) -> Hertz {
        self.tick_freq
    }

    #[inline]
    pub fn conversion(&self) -> TickConversion {
        self.conversion
    }

    /// Shortest programmable one-shot duration in nanoseconds.
    #[inline]
    pub fn min_delta_ns(&self) -> u64 {
        self.conversion.ticks_to_ns(MIN_ONESHOT_TICKS)
    }

    /// Longest programmable one-shot duration in nanoseconds.
    #[inline]
    pub fn max_delta_ns(&self) -> u64 {
        self.conversion.ticks_to_ns(MAX_ONESHOT_TICKS)
    }
}

/// Free-running 64-bit counter of the timer block.
///
/// Runs on the raw 24 MHz oscillator and never generates interrupts, which makes it a
/// monotonic time base independent of the tick timer.
pub struct Counter64 {
    regs: MmioTimer<'static>,
}

unsafe impl Send for Counter64 {}

impl Counter64 {
    pub const fn new(regs: MmioTimer<'static>) -> Self {
        Self { regs }
    }

    /// Steal the counter driver.
    ///
    /// # Safety
    ///
    /// This circumvents the PAC ownership model. The counter registers are not shared
    /// with the tick timer, but the caller must ensure no other instance writes the
    /// counter control register concurrently.
    pub const unsafe fn steal() -> Self {
        Self::new(unsafe { Timer::new_mmio_fixed() })
    }

    /// Coherent read of the 64-bit counter.
    ///
    /// The two halves can not be read atomically. The upper word is read before and
    /// after the lower word and the read repeats until both upper reads agree, carrying
    /// the fresher upper word into the next attempt.
    pub fn read_counter(&self) -> u64 {
        let mut upper = self.regs.read_cnt64_high();
        loop {
            let lower = self.regs.read_cnt64_low();
            let upper_again = self.regs.read_cnt64_high();
            if upper == upper_again {
                return ((upper as u64) << 32) | lower as u64;
            }
            upper = upper_again;
        }
    }
}

impl DelayNs for Counter64 {
    fn delay_ns(&mut self, ns: u32) {
        let ticks = (ns as u64 * OSC_24M.raw() as u64) / 1_000_000_000;
        let end = self.read_counter().wrapping_add(ticks);
        while self.read_counter() < end {
            core::hint::spin_loop();
        }
    }
}

static TICK_TIMER: Mutex<RefCell<Option<TickTimer>>> = Mutex::new(RefCell::new(None));

/// Install the tick timer driver as the instance used by [on_interrupt] and [with].
pub fn install(timer: TickTimer) -> Result<(), AlreadyInstalledError> {
    critical_section::with(|cs| {
        let mut cell = TICK_TIMER.borrow(cs).borrow_mut();
        if cell.is_some() {
            return Err(AlreadyInstalledError);
        }
        *cell = Some(timer);
        Ok(())
    })
}

/// Run a closure with exclusive access to the installed tick timer.
///
/// Returns [None] if no timer was installed. The tick callback receives the driver by
/// mutable reference already, it must not re-enter this function.
pub fn with<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut TickTimer) -> R,
{
    critical_section::with(|cs| TICK_TIMER.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Interrupt handler for the tick timer line, to be called from the interrupt dispatch.
pub fn on_interrupt() {
    with(|timer| timer.handle_interrupt());
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use approx::abs_diff_eq;
    use core::mem::MaybeUninit;
    use std::boxed::Box;

    const TICK_FREQ: Hertz = Hertz::from_raw(100);

    fn fake_timer(backing: &mut MaybeUninit<Timer>) -> (TickTimer, MmioTimer<'static>) {
        let mmio = unsafe { Timer::new_mmio_at(backing.as_mut_ptr() as usize) };
        let probe = unsafe { mmio.clone() };
        (
            TickTimer::new_with_init(mmio, SocVariant::Sun4i, TICK_FREQ),
            probe,
        )
    }

    #[test]
    fn init_programs_clocking() {
        let mut backing = MaybeUninit::<Timer>::zeroed();
        let (timer, probe) = fake_timer(&mut backing);
        // 24 MHz / 16 prescale / 100 Hz tick.
        assert_eq!(probe.read_interval_0(), 15_000);
        let ctrl = probe.read_ctrl_0();
        assert_eq!(ctrl.clk_src(), ClockSource::Osc24M);
        assert_eq!(ctrl.prescale(), u3::new(4));
        assert!(ctrl.reload());
        assert!(!ctrl.enable());
        assert!(probe.read_irq_enable().tmr0());
        assert_eq!(timer.mode(), Mode::Disabled);
        assert_eq!(timer.rating(), 100);
        assert_eq!(timer.min_delta_ns(), 1000);
        assert_eq!(timer.max_delta_ns(), 170_000);
    }

    #[test]
    fn periodic_mode_programs_interval_and_starts() {
        let mut backing = MaybeUninit::<Timer>::zeroed();
        let (mut timer, mut probe) = fake_timer(&mut backing);
        // Clobber the interval to verify the mode switch re-programs it.
        probe.write_interval_0(0xDEAD);
        timer.set_mode(Mode::Periodic);
        assert_eq!(probe.read_interval_0(), 15_000);
        let ctrl = probe.read_ctrl_0();
        assert_eq!(ctrl.mode(), CountMode::Continuous);
        assert!(ctrl.enable());
        assert_eq!(timer.mode(), Mode::Periodic);
    }

    #[test]
    fn one_shot_arm_and_rearm() {
        let mut backing = MaybeUninit::<Timer>::zeroed();
        let (mut timer, probe) = fake_timer(&mut backing);
        timer.set_mode(Mode::OneShot);
        let ctrl = probe.read_ctrl_0();
        assert_eq!(ctrl.mode(), CountMode::Single);
        // Selecting the mode does not start the timer yet.
        assert!(!ctrl.enable());

        timer.set_next_event(1);
        assert_eq!(probe.read_value_0(), 1);
        let ctrl = probe.read_ctrl_0();
        assert!(ctrl.enable());
        assert!(ctrl.reload());

        // Re-arming while running must land on the new value.
        timer.set_next_event(200);
        assert_eq!(probe.read_value_0(), 200);
        assert!(probe.read_ctrl_0().enable());
    }

    #[test]
    fn disable_clears_enable_only() {
        let mut backing = MaybeUninit::<Timer>::zeroed();
        let (mut timer, probe) = fake_timer(&mut backing);
        timer.set_mode(Mode::Periodic);
        timer.set_mode(Mode::Disabled);
        let ctrl = probe.read_ctrl_0();
        assert!(!ctrl.enable());
        // Clocking survives the stop.
        assert_eq!(ctrl.clk_src(), ClockSource::Osc24M);
        assert_eq!(ctrl.prescale(), u3::new(4));
        assert_eq!(timer.mode(), Mode::Disabled);
    }

    #[test]
    fn conversion_constants() {
        let conversion = TickConversion::new(timer_input_clk());
        // 1.5 MHz scaled by 2^32 / 1e9.
        assert_eq!(conversion.mult(), 6_442_450);
        // A single tick is 666 ns, reported as the 1000 ns floor.
        assert_eq!(conversion.ticks_to_ns(1), 1000);
        assert_eq!(conversion.ticks_to_ns(255), 170_000);
        assert_eq!(conversion.ns_to_ticks(170_000), 254);
        assert_eq!(conversion.ns_to_ticks(1000), 1);
        // 150 ticks at 1.5 MHz are exactly 100 us.
        assert_eq!(conversion.ticks_to_ns(150), 100_000);
        // One full periodic interval is one tick period within rounding error.
        assert!(abs_diff_eq!(
            conversion.ticks_to_ns(15_000) as f64,
            10_000_000.0,
            epsilon = 10.0
        ));
    }

    #[test]
    fn interrupt_handler_acks_and_rearms() {
        use core::sync::atomic::{AtomicU32, Ordering};
        static CALLS: AtomicU32 = AtomicU32::new(0);

        fn tick(timer: &mut TickTimer) {
            CALLS.fetch_add(1, Ordering::Relaxed);
            timer.set_next_event(42);
        }

        let mut backing = MaybeUninit::<Timer>::zeroed();
        let (mut timer, mut probe) = fake_timer(&mut backing);
        timer.set_mode(Mode::OneShot);
        timer.set_tick_handler(tick);
        // Both timer interrupt status bits set, only bit 0 may be cleared.
        let mut status = TimerIrqStatus::DEFAULT;
        status.set_tmr0(true);
        status.set_tmr1(true);
        probe.write_irq_status(status);
        timer.handle_interrupt();
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
        // The fake backing keeps the written ack pattern.
        assert_eq!(probe.read_irq_status().raw_value(), 0x1);
        // The callback armed the next event.
        assert_eq!(probe.read_value_0(), 42);
        assert!(probe.read_ctrl_0().enable());
    }

    #[test]
    fn counter64_reads_coherently() {
        let mut backing = MaybeUninit::<Timer>::zeroed();
        let mmio = unsafe { Timer::new_mmio_at(backing.as_mut_ptr() as usize) };
        let counter = Counter64::new(mmio);
        assert_eq!(counter.read_counter(), 0);
        // The counter halves are read-only through the register API.
        let base = backing.as_mut_ptr() as *mut u32;
        unsafe {
            base.byte_add(0xA4).write_volatile(0x1234_5678);
            base.byte_add(0xA8).write_volatile(0x1);
        }
        assert_eq!(counter.read_counter(), 0x1_1234_5678);
    }

    #[test]
    fn global_install_and_interrupt() {
        use core::sync::atomic::{AtomicU32, Ordering};
        static TICKS: AtomicU32 = AtomicU32::new(0);

        fn tick(timer: &mut TickTimer) {
            TICKS.fetch_add(1, Ordering::Relaxed);
            timer.set_next_event(3);
        }

        let backing: &'static mut MaybeUninit<Timer> = Box::leak(Box::new(MaybeUninit::zeroed()));
        let mmio = unsafe { Timer::new_mmio_at(backing.as_mut_ptr() as usize) };
        let probe = unsafe { mmio.clone() };
        let mut timer = TickTimer::new_with_init(mmio, SocVariant::Sun5i, TICK_FREQ);
        assert_eq!(timer.rating(), 300);
        timer.set_tick_handler(tick);
        install(timer).unwrap();

        with(|timer| timer.set_mode(Mode::OneShot)).unwrap();
        on_interrupt();
        assert_eq!(TICKS.load(Ordering::Relaxed), 1);
        assert_eq!(probe.read_value_0(), 3);

        let mut second_backing = MaybeUninit::<Timer>::zeroed();
        let second = unsafe { Timer::new_mmio_at(second_backing.as_mut_ptr() as usize) };
        assert!(
            install(TickTimer::new_with_init(
                second,
                SocVariant::Sun4i,
                TICK_FREQ
            ))
            .is_err()
        );
    }
}
