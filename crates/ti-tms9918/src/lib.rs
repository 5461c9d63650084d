//! Texas Instruments TMS9918A Video Display Processor family.
//!
//! Three chip variants share one interface:
//!
//! - [`Tms9918a`] — the stock console VDP: 16K VRAM, 2-phase address
//!   latch, seven screen modes, 32 sprites with a per-line cap.
//! - [`F18a`] — the FPGA replacement: unlockable extended register file,
//!   64-entry 12-bit palette RAM, per-line sprite-limit override, and an
//!   embedded TMS9900 coprocessor executing from VRAM.
//! - [`V9938`] — the MSX2-generation part: 128K VRAM behind a 17-bit
//!   address register, indirect register writes, 9-bit palette, rendering
//!   for the 9918-compatible modes.
//!
//! The console talks to all three through [`VideoProcessor`]: byte ports
//! for address/data/status, one `draw_scanline` call per visible line,
//! and a single `update_canvas` flush per frame. The variant is chosen
//! once, before a session starts, through [`VdpVariant::create`].

mod f18a;
mod tms9918a;
mod v9938;

pub mod palette;

pub use f18a::F18a;
pub use tms9918a::Tms9918a;
pub use v9938::V9938;

use emu_core::Stateful;
use ti_tms9900::Tms9900;

/// Framebuffer width in pixels (active area plus borders).
pub const FB_WIDTH: u32 = 320;
/// Framebuffer height in pixels (active area plus borders).
pub const FB_HEIGHT: u32 = 240;

/// Screen mode, derived from the mode bits spread across VR0 and VR1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    /// 32x24 characters, 8 pattern groups sharing a color byte.
    Graphics,
    /// 40x24 characters, 6 pixels wide, fixed fg/bg colors, no sprites.
    Text,
    /// Bitmap (graphics II): per-row pattern and color tables.
    Bitmap,
    /// 64x48 blocks of 4x4 pixels.
    Multicolor,
    /// Text addressing with bitmap pattern-table masking.
    BitmapText,
    /// Multicolor addressing with bitmap pattern-table masking.
    BitmapMulticolor,
    /// Mode bit combination with no defined display; renders fg/bg stripes.
    Illegal,
}

/// Which chip the factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VdpVariant {
    /// Stock TMS9918A.
    #[default]
    Tms9918a,
    /// F18A FPGA replacement.
    F18a,
    /// Yamaha V9938.
    V9938,
}

impl VdpVariant {
    /// Build the variant. `flicker` enables the hardware 4-sprites-per-line
    /// limit; without it up to 32 sprites render per line.
    #[must_use]
    pub fn create(self, flicker: bool) -> Box<dyn VideoProcessor> {
        match self {
            Self::Tms9918a => Box::new(Tms9918a::new(flicker)),
            Self::F18a => Box::new(F18a::new(flicker)),
            Self::V9938 => Box::new(V9938::new(flicker)),
        }
    }
}

/// The console-facing VDP contract.
///
/// Register decode, scanline rendering, status/interrupt signalling and
/// snapshotting. Methods the stock chip lacks (palette and indirect
/// register ports, the coprocessor) default to no-ops so the console can
/// drive every variant identically.
pub trait VideoProcessor: Stateful {
    /// Power-on reset: clear VRAM, registers, latch and status.
    fn reset(&mut self);

    /// Called once at the top of each frame, before scanline 0.
    fn init_frame(&mut self);

    /// Render scanline `y` (0..240) into the framebuffer.
    fn draw_scanline(&mut self, y: u32);

    /// Account for a scanline below the visible area (240..262). No pixels
    /// are produced but per-line side effects still run.
    fn draw_invisible_scanline(&mut self, y: u32);

    /// Frame flush. The scheduler calls this once per completed frame;
    /// renderers that draw directly into the framebuffer need no work here.
    fn update_canvas(&mut self);

    /// Write the address/register port (one byte of the 2-phase latch).
    fn write_address(&mut self, value: u8);

    /// Write the data port at the current address (auto-increments).
    fn write_data(&mut self, value: u8);

    /// Read the status register. Resets it to idle and clears the latch.
    fn read_status(&mut self) -> u8;

    /// Read the data port through the prefetch buffer (auto-increments).
    fn read_data(&mut self) -> u8;

    /// Write the palette port (variants with palette RAM).
    fn write_palette_port(&mut self, _value: u8) {}

    /// Write the indirect register port (variants with one).
    fn write_indirect_port(&mut self, _value: u8) {}

    /// Level of the interrupt line into the CRU controller.
    fn interrupt_pending(&self) -> bool;

    /// The rendered frame, ARGB, `FB_WIDTH` x `FB_HEIGHT`.
    fn framebuffer(&self) -> &[u32];

    /// The embedded coprocessor, if this variant has one.
    fn gpu_mut(&mut self) -> Option<&mut Tms9900> {
        None
    }

    /// Run the coprocessor for a scanline budget.
    fn run_gpu(&mut self, _budget: u32, _skip_breakpoint: bool) {}

    /// Which chip this is.
    fn variant(&self) -> VdpVariant;
}
