//! # HAL for the Allwinner sun4i/sun5i family of SoCs
//!
//! Hardware abstraction layer for the A10/A13 generation, built on top of the
//! [sun4i] PAC. The crate currently covers the interrupt controller and the timer
//! block, which together form the interrupt and system tick subsystem:
//!
//! - [intc]: 96-line vector interrupt controller with a lazy IRQ domain.
//! - [timer]: system tick timer with periodic and one-shot operation, plus the
//!   free-running 64-bit counter.
//! - [clocks] and [time]: fixed clock rates and [fugit] based time types.
//!
//! [init] wires both drivers up in one call for the common case.
#![no_std]

pub mod clocks;
pub mod intc;
pub mod prelude;
pub mod time;
pub mod timer;

pub use sun4i as pac;

use time::Hertz;

/// SoC variant the HAL is running on.
///
/// The variants share the peripheral layout. The distinction matters for the tick
/// timer rating, the A10 timer erratum makes the timer a last-resort tick source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SocVariant {
    /// A10 generation.
    Sun4i,
    /// A13/A10s generation.
    Sun5i,
}

/// Configuration for [init].
pub struct Config {
    pub variant: SocVariant,
    /// Tick rate used when the timer runs in periodic mode.
    pub tick_freq: Hertz,
    /// Interrupt dispatch callback, see [intc::handle_irq].
    pub dispatch: intc::DispatchHandler,
    /// Tick callback, see [timer::TickTimer::handle_interrupt].
    pub tick_handler: timer::TickHandler,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("peripheral singleton was already taken")]
    PeripheralsAlreadyTaken,
    #[error("intc error: {0}")]
    Intc(#[from] intc::AlreadyInstalledError),
    #[error("timer error: {0}")]
    Timer(#[from] timer::AlreadyInstalledError),
}

/// Set up the interrupt and tick subsystem in one call.
///
/// Takes the PAC peripherals, initializes the interrupt controller and the tick
/// timer, installs both drivers into their global handler layers and unmasks the
/// tick timer line. The timer is left in [timer::Mode::Disabled], select a mode
/// through [timer::with] once the scheduler is ready.
///
/// Returns the logical IRQ number assigned to the tick timer line.
pub fn init(config: Config) -> Result<intc::LogicalIrq, InitError> {
    let peripherals = pac::Peripherals::take().ok_or(InitError::PeripheralsAlreadyTaken)?;

    let mut controller = intc::InterruptController::new_with_init(peripherals.intc);
    controller.set_dispatch_handler(config.dispatch);
    let timer_line = intc::HwLine::from(intc::InterruptSource::Timer0);
    let timer_irq = controller.resolve(timer_line);
    controller.unmask(timer_line);
    intc::install(controller)?;

    let mut tick_timer =
        timer::TickTimer::new_with_init(peripherals.timer, config.variant, config.tick_freq);
    tick_timer.set_tick_handler(config.tick_handler);
    timer::install(tick_timer)?;

    Ok(timer_irq)
}
