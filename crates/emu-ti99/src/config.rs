//! TI-99/4A system configuration.

use ti_tms9918::VdpVariant;

/// Which disk controller card is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskControllerKind {
    /// TI Disk Controller card (FD1771 model) at CRU base 0x1100.
    TiFdc,
    /// No disk controller.
    #[default]
    None,
}

/// Which run loop paces frame execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacerKind {
    /// Deadline-based timer targeting ~16.67 ms per frame.
    #[default]
    FixedInterval,
    /// Display-driven: render only when a frame interval has elapsed.
    Vsync,
}

/// Configuration for a TI-99/4A console.
///
/// ROM images are injected as raw byte vectors; the config carries no
/// file paths and is never persisted.
#[derive(Clone)]
pub struct Ti99Config {
    /// Console ROM (up to 8K at 0x0000).
    pub rom: Vec<u8>,
    /// Console GROMs (loaded at GROM address 0x0000).
    pub grom: Vec<u8>,
    /// Cartridge ROM (8K banks at 0x6000, bank-switched on write).
    pub cartridge_rom: Option<Vec<u8>>,
    /// Cartridge GROMs (loaded at GROM address 0x6000).
    pub cartridge_grom: Option<Vec<u8>>,
    /// Video processor variant.
    pub vdp: VdpVariant,
    /// Sprite flicker emulation (4-per-line cap when on).
    pub flicker: bool,
    /// 32K memory expansion at 0x2000-0x3FFF and 0xA000-0xFFFF.
    pub ram_32k: bool,
    /// Speech synthesizer attached.
    pub speech: bool,
    /// Disk controller card.
    pub disk: DiskControllerKind,
    /// Disk controller DSR ROM (8K in the 0x4000 window).
    pub fdc_dsr: Option<Vec<u8>>,
    /// Serial-bridge card installed.
    pub bridge: bool,
    /// Remote address for the serial-bridge transport.
    pub bridge_address: String,
    /// Serial-bridge DSR ROM (8K in the 0x4000 window).
    pub bridge_dsr: Option<Vec<u8>>,
    /// Triple the per-scanline CPU budget.
    pub fast: bool,
    /// Frame pacing strategy for the run loop.
    pub pacer: PacerKind,
}

impl Default for Ti99Config {
    fn default() -> Self {
        Self {
            rom: Vec::new(),
            grom: Vec::new(),
            cartridge_rom: None,
            cartridge_grom: None,
            vdp: VdpVariant::Tms9918a,
            flicker: true,
            ram_32k: true,
            speech: true,
            disk: DiskControllerKind::None,
            fdc_dsr: None,
            bridge: false,
            bridge_address: String::new(),
            bridge_dsr: None,
            fast: false,
            pacer: PacerKind::FixedInterval,
        }
    }
}
