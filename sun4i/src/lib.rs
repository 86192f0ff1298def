//! # PAC for the Allwinner sun4i/sun5i SoC family
//!
//! Register-level peripheral access for the interrupt controller and the timer unit
//! shared by the A10 (sun4i) and A13/A10s (sun5i) generation of SoCs.
#![no_std]

use once_cell::sync::OnceCell;

pub mod intc;
pub mod timer;

static PERIPHERALS_TAKEN: OnceCell<()> = OnceCell::new();

/// Peripheral blocks of the device.
pub struct Peripherals {
    pub intc: intc::MmioIntc<'static>,
    pub timer: timer::MmioTimer<'static>,
}

impl Peripherals {
    /// Take the peripherals. This only works once.
    pub fn take() -> Option<Self> {
        PERIPHERALS_TAKEN.set(()).ok()?;
        Some(unsafe { Self::steal() })
    }

    /// Create a new peripheral block structure.
    ///
    /// # Safety
    ///
    /// This circumvents the singleton check of [Self::take] and can be used to create an
    /// arbitrary number of handles to the same peripherals. The user must ensure that
    /// concurrent accesses are safe and do not interfere with each other.
    pub unsafe fn steal() -> Self {
        Self {
            intc: unsafe { intc::Intc::new_mmio_fixed() },
            timer: unsafe { timer::Timer::new_mmio_fixed() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peripherals_take_only_once() {
        assert!(Peripherals::take().is_some());
        assert!(Peripherals::take().is_none());
    }
}
