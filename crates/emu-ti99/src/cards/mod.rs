//! Peripheral expansion cards.
//!
//! A card claims a 128-bit CRU window (addressed by its CRU base) and may
//! map ROM or registers into the 0x4000-0x5FFF DSR window while its
//! enable bit is set. The bus dispatches by address range to at most one
//! owning card; unclaimed ranges fall through.

use emu_core::Stateful;

mod tifdc;
mod tipi;

pub use tifdc::TiFdc;
pub use tipi::{BridgeTransport, LoopbackTransport, TipiCard};

/// Bus-facing contract every expansion card satisfies.
pub trait PeripheralCard: Stateful {
    /// Stable identifier used for registry bookkeeping and snapshots.
    fn id(&self) -> &'static str;

    /// CRU base address (the value software loads into R12).
    fn cru_base(&self) -> u16;

    /// Read one bit of the card's CRU window. `bit` is relative to the
    /// window start (0-127).
    fn read_cru_bit(&mut self, bit: u16) -> bool;

    /// Write one bit of the card's CRU window.
    fn write_cru_bit(&mut self, bit: u16, value: bool);

    /// Hardware reset.
    fn reset(&mut self);

    /// Advance card-internal timing by one scanline.
    fn tick_scanline(&mut self) {}

    /// Whether the card is currently holding the CPU off the bus.
    fn suspend_pending(&self) -> bool {
        false
    }
}

/// A card that maps device service ROM or registers into the DSR window.
pub trait DsrCard: PeripheralCard {
    /// Whether the card's page is switched into 0x4000-0x5FFF.
    fn rom_enabled(&self) -> bool;

    /// Word read from the DSR window (addr in 0x4000-0x5FFF).
    fn read_word(&mut self, addr: u16) -> u16;

    /// Word write to the DSR window.
    fn write_word(&mut self, addr: u16, value: u16);
}

/// Ownership slot in the card registry. One variant per card kind keeps
/// typed access available alongside the trait-object dispatch.
pub enum CardSlot {
    Fdc(TiFdc),
    Bridge(TipiCard),
}

impl CardSlot {
    #[must_use]
    pub fn as_dsr(&self) -> &dyn DsrCard {
        match self {
            CardSlot::Fdc(card) => card,
            CardSlot::Bridge(card) => card,
        }
    }

    pub fn as_dsr_mut(&mut self) -> &mut dyn DsrCard {
        match self {
            CardSlot::Fdc(card) => card,
            CardSlot::Bridge(card) => card,
        }
    }
}
