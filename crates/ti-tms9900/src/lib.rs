//! Texas Instruments TMS9900 16-bit CPU emulator.
//!
//! The 9900 keeps its sixteen general registers in memory: the workspace
//! pointer (WP) names a 32-byte block of RAM and R0-R15 are words within
//! it. Context switches (BLWP, XOP, interrupts) swap the whole register
//! file by loading a new WP and saving the old WP/PC/ST into the new
//! workspace's R13-R15.
//!
//! Execution is instruction-stepped against a cycle budget: `run()`
//! executes whole instructions until the budget is spent and reports the
//! overrun, which the caller subtracts from the next budget. This matches
//! a scanline-interleaved frame scheduler; the 9900's multi-cycle memory
//! accesses are folded into per-instruction cycle costs from the
//! datasheet timing tables.

mod cpu;
mod execute;
mod status;

pub use cpu::Tms9900;
pub use status::{ST_AGT, ST_C, ST_EQ, ST_INT_MASK, ST_LGT, ST_OP, ST_OV, ST_X};
