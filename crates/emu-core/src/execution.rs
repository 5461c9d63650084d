//! Execution unit contract.

use crate::ticks::Ticks;

/// Identifies an execution unit to debuggers and frame results.
///
/// The console always has a main CPU; the enhanced video processor brings
/// a second unit (its command coprocessor) that shares the frame budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionUnitId {
    /// The main CPU.
    Cpu,
    /// The video coprocessor.
    Gpu,
}

/// A cycle-budgeted execution unit.
///
/// The frame scheduler runs units against per-scanline cycle budgets and
/// stops early when one halts on a breakpoint. That halt is cooperative:
/// it is only ever taken at an instruction boundary, and resuming is the
/// caller's decision. Running itself is not part of this trait because
/// each unit is driven against its own bus type; this is the control and
/// inspection surface the scheduler and debuggers share.
pub trait ExecutionUnit {
    /// Current program counter.
    fn pc(&self) -> u16;

    /// Set or clear the breakpoint address.
    fn set_breakpoint(&mut self, addr: Option<u16>);

    /// Current breakpoint address, if any.
    fn breakpoint(&self) -> Option<u16>;

    /// True if the last run stopped on the breakpoint (or on an armed
    /// break-after-next). Cleared when the unit next runs.
    fn is_stopped_at_breakpoint(&self) -> bool;

    /// Arm a stop after the next completed instruction.
    fn break_after_next(&mut self);

    /// Externally imposed suspension. A suspended unit is skipped by the
    /// scheduler for the scanline; video rendering and cycle accounting
    /// continue regardless.
    fn is_suspended(&self) -> bool;

    /// Set or clear the suspension flag.
    fn set_suspended(&mut self, suspended: bool);

    /// True while the unit is idle (IDLE instruction executed, or a
    /// stopped coprocessor). Idle units consume no budget.
    fn is_idle(&self) -> bool;

    /// Total cycles executed since reset.
    fn cycles(&self) -> Ticks;
}
