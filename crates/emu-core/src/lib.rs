//! Core traits shared by the chip crates and the console.
//!
//! The console runs one video frame as 262 scanline steps, handing each
//! execution unit a cycle budget per scanline. Everything a chip needs to
//! participate — bus access, budgeted execution, snapshot save/restore,
//! and debug inspection — is defined here.

mod bus;
mod execution;
mod observable;
mod state;
mod ticks;

pub use bus::Bus;
pub use execution::{ExecutionUnit, ExecutionUnitId};
pub use observable::{Observable, Value};
pub use state::{Stateful, state_bytes, state_get_bytes};
pub use ticks::Ticks;
