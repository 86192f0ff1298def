//! # INTC (interrupt controller) register module.
use static_assertions::const_assert_eq;

pub const INTC_BASE_ADDR: usize = 0x01C2_0400;

/// Number of interrupt sources handled by the controller.
pub const NUM_INTERRUPTS: usize = 96;

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Protection {
    /// When set, the controller registers can only be written in privileged mode.
    #[bit(0, rw)]
    enable: bool,
}

/// Trigger type of the external NMI pin.
#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, Default, PartialEq, Eq)]
pub enum NmiTrigger {
    #[default]
    LowLevel = 0b00,
    NegativeEdge = 0b01,
    HighLevel = 0b10,
    PositiveEdge = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct NmiControl {
    #[bits(0..=1, rw)]
    trigger: NmiTrigger,
}

/// Interrupt controller registers.
///
/// All multi-bank registers cover one interrupt source per bit: bit `i` of bank `b`
/// belongs to source `b * 32 + i`.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Intc {
    /// Vector address of the active interrupt. The entry offset is `source * 4`.
    #[mmio(PureRead)]
    vector: u32,
    /// Base address of the vector table.
    base_addr: u32,
    /// Register access protection.
    protect: Protection,
    /// NMI trigger configuration.
    nmi_ctrl: NmiControl,
    /// IRQ pending registers. Writing 1 to a bit position clears it, so acknowledging
    /// must never go through a read-modify-write cycle. No `modify` accessor exists
    /// for this reason.
    #[mmio(PureRead, Write)]
    irq_pending: [u32; 3],
    _reserved_0: u32,
    /// FIQ pending registers, same write-1-to-clear behavior as the IRQ bank.
    #[mmio(PureRead, Write)]
    fiq_pending: [u32; 3],
    _reserved_1: u32,
    /// IRQ/FIQ routing select registers. A set bit routes the source to FIQ.
    select: [u32; 3],
    _reserved_2: u32,
    /// Interrupt enable registers.
    enable: [u32; 3],
    _reserved_3: u32,
    /// Controller global mask registers. A set bit masks the source regardless of its
    /// enable bit.
    mask: [u32; 3],
    _reserved_4: u32,
    /// Interrupt response registers.
    response: [u32; 3],
    _reserved_5: u32,
    /// Fast forcing registers. A set bit forces the source pending from software.
    fast_forcing: [u32; 3],
    _reserved_6: u32,
    /// Source priority registers, 2 bits per interrupt source.
    priority: [u32; 6],
}

const_assert_eq!(core::mem::size_of::<Intc>(), 0x98);

impl Intc {
    /// Create a new INTC MMIO instance at the fixed base address.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    #[inline]
    pub const unsafe fn new_mmio_fixed() -> MmioIntc<'static> {
        unsafe { Self::new_mmio_at(INTC_BASE_ADDR) }
    }
}
