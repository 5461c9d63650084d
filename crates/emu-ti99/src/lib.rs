//! TI-99/4A home computer emulator.
//!
//! The TMS9900 CPU runs at 3.0 MHz; one NTSC frame is 262 scanlines at
//! ~60 Hz, giving 50,000 CPU cycles per frame or a nominal 190 cycles
//! per scanline. The PSG is clocked from the 3.58 MHz colourburst
//! crystal. The optional F18A video processor carries a 100 MHz GPU
//! (a second TMS9900 executing from VRAM) that shares the frame budget
//! at 6,361 cycles per scanline.
//!
//! The frame scheduler interleaves scanline rendering with CPU and GPU
//! cycle budgets; peripheral cards (floppy controller, serial bridge)
//! claim CRU pages and the 0x4000 DSR ROM window on the memory bus.

pub mod capture;
pub mod cards;
mod config;
mod console;
pub mod cru;
pub mod disk;
pub mod input;
mod keyboard;
pub mod keyboard_map;
pub mod mcp;
mod memory;
pub mod pacer;
mod speech;
mod tape;

pub use cards::{BridgeTransport, CardSlot, DsrCard, LoopbackTransport, PeripheralCard, TiFdc, TipiCard};
pub use config::{DiskControllerKind, PacerKind, Ti99Config};
pub use console::{
    AUDIO_SAMPLE_RATE, CYCLES_PER_SCANLINE, FrameResult, GPU_CYCLES_PER_SCANLINE, PSG_CLOCK,
    SCANLINES_PER_FRAME, Ti99,
};
pub use disk::{DiskDrive, DiskImage};
pub use input::{InputEvent, InputQueue};
pub use keyboard::Keyboard;
pub use memory::Memory;
pub use speech::Tms5200;
pub use tape::Tape;
