//! # Interrupt controller (INTC) driver
//!
//! The INTC is the single vector interrupt controller of the sun4i/sun5i SoC generation.
//! It arbitrates 96 hardware lines split over three 32-bit register banks and presents
//! the winning line in its vector register.
//!
//! The primary interface is the [InterruptController] driver. It owns the register block
//! together with the [IrqDomain], which lazily assigns stable [LogicalIrq] numbers to
//! hardware lines so consumers never deal with raw line numbers. A configured driver is
//! handed to [install], after which [handle_irq] serves as the IRQ trap vector entry and
//! [with] grants serialized run-time access for mask and unmask operations.
use core::cell::RefCell;

use critical_section::Mutex;
use sun4i::intc::{Intc, MmioIntc, NmiControl, Protection};

pub use sun4i::intc::{NUM_INTERRUPTS, NmiTrigger};

/// Hardware line of the non-maskable interrupt source.
pub const NMI_LINE: HwLine = HwLine(0);

/// Hardware interrupt line in the range `[0, 96)`.
///
/// The wrapper ties the bank/bit split of the three register banks to a validated line
/// number, so out-of-range accesses are unrepresentable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HwLine(u8);

impl HwLine {
    /// Create a new line wrapper. Returns [None] for lines outside `[0, 96)`.
    pub const fn new(line: u8) -> Option<Self> {
        if line >= NUM_INTERRUPTS as u8 {
            return None;
        }
        Some(Self(line))
    }

    /// Create a new line wrapper without the range check.
    ///
    /// # Safety
    ///
    /// The passed line number must be smaller than [NUM_INTERRUPTS].
    pub const unsafe fn new_unchecked(line: u8) -> Self {
        Self(line)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Index of the 32-bit register bank covering this line.
    #[inline]
    pub const fn bank(self) -> usize {
        (self.0 / 32) as usize
    }

    /// Bit mask of this line within its register bank.
    #[inline]
    pub const fn bit_mask(self) -> u32 {
        1 << (self.0 % 32)
    }
}

/// Interrupt sources of the sun4i (A10) interrupt controller.
///
/// The sun5i generation shares this numbering for the peripheral blocks present on both
/// SoCs. Sources without a name here are still reachable through [HwLine::new].
#[derive(Debug, Eq, PartialEq, Clone, Copy, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum InterruptSource {
    Enmi = 0,
    Uart0 = 1,
    Uart1 = 2,
    Uart2 = 3,
    Uart3 = 4,
    Ir0 = 5,
    Ir1 = 6,
    Twi0 = 7,
    Twi1 = 8,
    Twi2 = 9,
    Spi0 = 10,
    Spi1 = 11,
    Spi2 = 12,
    Spdif = 13,
    Ac97 = 14,
    Ts = 15,
    I2s = 16,
    Uart4 = 17,
    Uart5 = 18,
    Uart6 = 19,
    Uart7 = 20,
    Keypad = 21,
    Timer0 = 22,
    Timer1 = 23,
    Timer2 = 24,
    Timer3 = 25,
    Can = 26,
    Dma = 27,
    Pio = 28,
    TouchPanel = 29,
    AudioCodec = 30,
    Lradc = 31,
    Sdmmc0 = 32,
    Sdmmc1 = 33,
    Sdmmc2 = 34,
    Sdmmc3 = 35,
    MemoryStick = 36,
    Nand = 37,
    Usb0 = 38,
    Usb1 = 39,
    Usb2 = 40,
    Scr = 41,
    Csi0 = 42,
    Csi1 = 43,
    Lcd0 = 44,
    Lcd1 = 45,
    Mp = 46,
    DeFe0 = 47,
    DeFe1 = 48,
    Pmu = 49,
    Spi3 = 50,
    Tzasc = 51,
    Pata = 52,
    Ve = 53,
    Ss = 54,
    Emac = 55,
    Sata = 56,
    Gps = 57,
    Hdmi = 58,
    Tve = 59,
    Ace = 60,
    Tvd = 61,
    Ps2_0 = 62,
    Ps2_1 = 63,
    Usb3 = 64,
    Usb4 = 65,
    PlePfm = 66,
    Timer4 = 67,
    Timer5 = 68,
    GpuGp = 69,
    GpuGpmmu = 70,
    GpuPp0 = 71,
    GpuPpmmu0 = 72,
    GpuPmu = 73,
}

impl From<InterruptSource> for HwLine {
    fn from(source: InterruptSource) -> Self {
        HwLine(source as u8)
    }
}

/// Logical IRQ number allocated by the [IrqDomain].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LogicalIrq(u8);

impl LogicalIrq {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Lazy translation table between hardware lines and logical IRQ numbers.
///
/// Logical numbers are handed out sequentially the first time a line is resolved and
/// stay stable afterwards. One slot exists per hardware line, so the allocation can
/// never run out of numbers.
pub struct IrqDomain {
    forward: [Option<LogicalIrq>; NUM_INTERRUPTS],
    reverse: [Option<HwLine>; NUM_INTERRUPTS],
    next_id: u8,
}

impl IrqDomain {
    pub const fn new() -> Self {
        Self {
            forward: [None; NUM_INTERRUPTS],
            reverse: [None; NUM_INTERRUPTS],
            next_id: 0,
        }
    }

    /// Resolve a hardware line to its logical IRQ number, allocating one on first use.
    pub fn resolve(&mut self, line: HwLine) -> LogicalIrq {
        let idx = line.raw() as usize;
        if let Some(irq) = self.forward[idx] {
            return irq;
        }
        let irq = LogicalIrq(self.next_id);
        self.next_id += 1;
        self.forward[idx] = Some(irq);
        self.reverse[irq.raw() as usize] = Some(line);
        log::debug!(
            "intc: mapped hardware line {} to logical irq {}",
            line.raw(),
            irq.raw()
        );
        irq
    }

    /// Look up an existing mapping without allocating a new one.
    #[inline]
    pub fn lookup(&self, line: HwLine) -> Option<LogicalIrq> {
        self.forward[line.raw() as usize]
    }

    /// Hardware line of an allocated logical IRQ number.
    #[inline]
    pub fn hw_line(&self, irq: LogicalIrq) -> Option<HwLine> {
        if irq.raw() as usize >= NUM_INTERRUPTS {
            return None;
        }
        self.reverse[irq.raw() as usize]
    }
}

impl Default for IrqDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("interrupt controller already installed")]
pub struct AlreadyInstalledError;

#[derive(Debug, thiserror::Error)]
#[error("logical irq {0} has no hardware line mapping")]
pub struct NotMappedError(pub u8);

/// Dispatch callback invoked by [handle_irq] with the logical IRQ number of the winning
/// pending interrupt.
pub type DispatchHandler = fn(LogicalIrq);

/// Higher-level INTC driver.
///
/// The flow of using this driver is as follows:
///
/// 1. Create the driver using [Self::new_with_init], which brings the controller into a
///    defined state: all lines disabled, the controller global mask cleared, every stale
///    pending bit acknowledged and register protection enabled.
/// 2. Register the dispatch callback with [Self::set_dispatch_handler], unmask the
///    required lines and hand the driver to [install].
/// 3. Call [handle_irq] from the IRQ trap vector. Run-time reconfiguration goes through
///    [with].
pub struct InterruptController {
    regs: MmioIntc<'static>,
    domain: IrqDomain,
    dispatch: Option<DispatchHandler>,
}

unsafe impl Send for InterruptController {}

impl InterruptController {
    /// Create the driver and call [Self::initialize] to bring the controller into a
    /// defined state.
    pub fn new_with_init(regs: MmioIntc<'static>) -> Self {
        let mut controller = Self::new(regs);
        controller.initialize();
        controller
    }

    /// Create the driver without touching the hardware.
    pub const fn new(regs: MmioIntc<'static>) -> Self {
        Self {
            regs,
            domain: IrqDomain::new(),
            dispatch: None,
        }
    }

    /// Steal the driver from the PAC.
    ///
    /// # Safety
    ///
    /// This circumvents ownership checks and creates a driver with a fresh, empty IRQ
    /// domain. The caller must ensure no second driver instance is in active use.
    pub const unsafe fn steal() -> Self {
        Self::new(unsafe { Intc::new_mmio_fixed() })
    }

    /// Controller reset sequence.
    ///
    /// Disables every line, clears the controller global mask, acknowledges all stale
    /// pending bits, enables register protection and programs the level-triggered NMI
    /// default. Masking and unmasking at run-time is done through the enable registers
    /// alone, the global mask bank stays untouched after this point.
    pub fn initialize(&mut self) {
        for bank in 0..3 {
            // Unwrap okay, bank index is valid.
            self.regs.write_enable(bank, 0).unwrap();
        }
        for bank in 0..3 {
            // Unwrap okay, bank index is valid.
            self.regs.write_mask(bank, 0).unwrap();
        }
        for bank in 0..3 {
            // Unwrap okay, bank index is valid.
            self.regs.write_irq_pending(bank, 0xFFFF_FFFF).unwrap();
        }
        self.regs
            .write_protect(Protection::builder().with_enable(true).build());
        self.regs
            .write_nmi_ctrl(NmiControl::builder().with_trigger(NmiTrigger::LowLevel).build());
    }

    /// Acknowledge a pending interrupt.
    ///
    /// The pending registers are write-1-to-clear. Only the bit of the given line is
    /// written, a read-modify-write cycle here would acknowledge every other pending
    /// line in the same bank as well.
    #[inline]
    pub fn acknowledge(&mut self, line: HwLine) {
        // Unwrap okay, bank index is valid.
        self.regs
            .write_irq_pending(line.bank(), line.bit_mask())
            .unwrap();
    }

    /// Disable a line by clearing its enable bit.
    #[inline]
    pub fn mask(&mut self, line: HwLine) {
        // Unwrap okay, calculated bank index is always valid.
        self.regs
            .modify_enable(line.bank(), |mut val| {
                val &= !line.bit_mask();
                val
            })
            .unwrap();
    }

    /// Enable a line by setting its enable bit.
    ///
    /// The non-maskable source latches its pending bit even while disabled, so enabling
    /// it acknowledges the line right away. Without this, a stale NMI would fire the
    /// moment the line is enabled.
    #[inline]
    pub fn unmask(&mut self, line: HwLine) {
        // Unwrap okay, calculated bank index is always valid.
        self.regs
            .modify_enable(line.bank(), |mut val| {
                val |= line.bit_mask();
                val
            })
            .unwrap();
        if line == NMI_LINE {
            self.acknowledge(line);
        }
    }

    /// Check whether a line is currently pending.
    #[inline]
    pub fn is_pending(&self, line: HwLine) -> bool {
        // Unwrap okay, valid bank index.
        self.regs.read_irq_pending(line.bank()).unwrap() & line.bit_mask() != 0
    }

    /// Check whether a line is enabled.
    #[inline]
    pub fn is_enabled(&self, line: HwLine) -> bool {
        // Unwrap okay, valid bank index.
        self.regs.read_enable(line.bank()).unwrap() & line.bit_mask() != 0
    }

    /// Force a line pending from software via the fast-forcing register.
    #[inline]
    pub fn software_trigger(&mut self, line: HwLine) {
        // Unwrap okay, valid bank index.
        self.regs
            .modify_fast_forcing(line.bank(), |mut val| {
                val |= line.bit_mask();
                val
            })
            .unwrap();
    }

    /// Remove a software-forced trigger again.
    #[inline]
    pub fn clear_software_trigger(&mut self, line: HwLine) {
        // Unwrap okay, valid bank index.
        self.regs
            .modify_fast_forcing(line.bank(), |mut val| {
                val &= !line.bit_mask();
                val
            })
            .unwrap();
    }

    /// Configure the trigger type of the external NMI pin.
    #[inline]
    pub fn set_nmi_trigger(&mut self, trigger: NmiTrigger) {
        self.regs
            .write_nmi_ctrl(NmiControl::builder().with_trigger(trigger).build());
    }

    /// Resolve a hardware line through the IRQ domain, allocating a logical number on
    /// first use.
    #[inline]
    pub fn resolve(&mut self, line: HwLine) -> LogicalIrq {
        self.domain.resolve(line)
    }

    /// Read-only access to the IRQ domain.
    #[inline]
    pub fn domain(&self) -> &IrqDomain {
        &self.domain
    }

    /// Register the dispatch callback invoked by [handle_irq].
    pub fn set_dispatch_handler(&mut self, dispatch: DispatchHandler) {
        self.dispatch = Some(dispatch);
    }

    /// Acknowledge by logical IRQ number.
    pub fn acknowledge_logical(&mut self, irq: LogicalIrq) -> Result<(), NotMappedError> {
        let line = self.domain.hw_line(irq).ok_or(NotMappedError(irq.raw()))?;
        self.acknowledge(line);
        Ok(())
    }

    /// Disable by logical IRQ number.
    pub fn mask_logical(&mut self, irq: LogicalIrq) -> Result<(), NotMappedError> {
        let line = self.domain.hw_line(irq).ok_or(NotMappedError(irq.raw()))?;
        self.mask(line);
        Ok(())
    }

    /// Enable by logical IRQ number.
    pub fn unmask_logical(&mut self, irq: LogicalIrq) -> Result<(), NotMappedError> {
        let line = self.domain.hw_line(irq).ok_or(NotMappedError(irq.raw()))?;
        self.unmask(line);
        Ok(())
    }

    /// Decode the pending interrupt with the highest hardware priority.
    ///
    /// The vector register holds the byte offset of the active vector table entry, so
    /// the winning line is the register value shifted right by two. The line is resolved
    /// through the IRQ domain. A vector outside the valid line range is a spurious read
    /// and yields [None] after a warning, the hot path must keep running.
    pub fn pending_irq(&mut self) -> Option<LogicalIrq> {
        let vector = self.regs.read_vector();
        let line = vector >> 2;
        if line >= NUM_INTERRUPTS as u32 {
            log::warn!("intc: spurious interrupt vector {:#010x}", vector);
            return None;
        }
        // Range checked above.
        let line = unsafe { HwLine::new_unchecked(line as u8) };
        Some(self.resolve(line))
    }
}

static CONTROLLER: Mutex<RefCell<Option<InterruptController>>> = Mutex::new(RefCell::new(None));

/// Install the controller driver as the instance used by [handle_irq] and [with].
///
/// Re-initialization is not supported, a second install fails.
pub fn install(controller: InterruptController) -> Result<(), AlreadyInstalledError> {
    critical_section::with(|cs| {
        let mut cell = CONTROLLER.borrow(cs).borrow_mut();
        if cell.is_some() {
            return Err(AlreadyInstalledError);
        }
        *cell = Some(controller);
        Ok(())
    })
}

/// Run a closure with exclusive access to the installed controller.
///
/// Returns [None] if no controller was installed.
pub fn with<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut InterruptController) -> R,
{
    critical_section::with(|cs| CONTROLLER.borrow(cs).borrow_mut().as_mut().map(f))
}

/// IRQ trap vector entry function.
///
/// Decodes the winning pending interrupt of the installed controller and invokes the
/// dispatch callback with its logical IRQ number. The controller borrow is released
/// before the callback runs, so the callback is free to re-enter [with] to acknowledge
/// or mask the line it was handed. Without an installed controller or without a pending
/// interrupt this returns quietly.
pub fn handle_irq() {
    let pending = critical_section::with(|cs| {
        let mut cell = CONTROLLER.borrow(cs).borrow_mut();
        let controller = cell.as_mut()?;
        let irq = controller.pending_irq()?;
        Some((irq, controller.dispatch))
    });
    if let Some((irq, Some(dispatch))) = pending {
        dispatch(irq);
    }
}
