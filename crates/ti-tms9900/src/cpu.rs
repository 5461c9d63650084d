//! TMS9900 processor state and the budgeted run loop.

use emu_core::{Bus, ExecutionUnit, Observable, Stateful, Ticks, Value};
use serde_json::json;

use crate::status::{ST_AGT, ST_C, ST_EQ, ST_INT_MASK, ST_LGT, ST_OP, ST_OV, ST_X};

/// Reset vector: new WP at 0x0000, new PC at 0x0002.
const RESET_VECTOR: u16 = 0x0000;
/// Level-1 interrupt vector: new WP at 0x0004, new PC at 0x0006.
const INTERRUPT_VECTOR: u16 = 0x0004;
/// Cycles for a vectored interrupt context switch.
const INTERRUPT_CYCLES: u64 = 22;
/// Cycles for the reset context switch.
const RESET_CYCLES: u64 = 26;

/// Texas Instruments TMS9900 CPU.
///
/// The core holds only PC, WP and ST; the sixteen general registers live
/// in memory at WP. The bus is supplied per call so one core type serves
/// both the console CPU (full memory map) and the video coprocessor
/// (VRAM-backed map with nothing wired to the interrupt input).
#[derive(Debug, Clone)]
pub struct Tms9900 {
    /// Program counter (always even).
    pub(crate) pc: u16,
    /// Workspace pointer (always even).
    pub(crate) wp: u16,
    /// Status register.
    pub(crate) st: u16,
    /// IDLE instruction executed; waiting for an interrupt.
    pub(crate) idle: bool,
    /// Externally imposed suspension (slow peripheral, transport loss).
    suspended: bool,
    breakpoint: Option<u16>,
    break_after_next: bool,
    stopped_at_breakpoint: bool,
    /// Unrecognised opcodes executed since reset.
    illegal_ops: u64,
    pub(crate) total_cycles: u64,
}

impl Tms9900 {
    /// Create a core with PC/WP/ST cleared. Callers normally follow up
    /// with `reset()` once the bus holds the vector table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pc: 0,
            wp: 0,
            st: 0,
            idle: false,
            suspended: false,
            breakpoint: None,
            break_after_next: false,
            stopped_at_breakpoint: false,
            illegal_ops: 0,
            total_cycles: 0,
        }
    }

    /// Hardware reset: load WP and PC from the reset vector with the
    /// interrupt mask cleared (the boot ROM raises it with LIMI).
    pub fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.st = 0;
        self.idle = false;
        self.suspended = false;
        self.break_after_next = false;
        self.stopped_at_breakpoint = false;
        self.wp = bus.read_word(RESET_VECTOR);
        self.pc = bus.read_word(RESET_VECTOR.wrapping_add(2));
        self.total_cycles += RESET_CYCLES;
    }

    /// Run whole instructions until `budget` cycles are consumed, a
    /// breakpoint is hit, or the bus requests suspension.
    ///
    /// Returns the cycle overrun (cycles consumed beyond the budget by
    /// the final instruction); the caller subtracts it from the next
    /// scanline's budget. `skip_breakpoint` suppresses the breakpoint
    /// check for the first instruction so a halted core can resume off
    /// its own breakpoint address.
    pub fn run<B: Bus>(&mut self, bus: &mut B, budget: u32, mut skip_breakpoint: bool) -> u32 {
        self.stopped_at_breakpoint = false;
        let start = self.total_cycles;
        let end = start + u64::from(budget);

        while self.total_cycles < end {
            if bus.interrupt_pending() && (self.st & ST_INT_MASK) >= 1 {
                self.take_interrupt(bus);
            }
            if self.idle {
                // IDLE burns the rest of the budget waiting on the
                // interrupt line.
                self.total_cycles = end;
                break;
            }
            if !skip_breakpoint && self.breakpoint == Some(self.pc) {
                self.stopped_at_breakpoint = true;
                break;
            }
            skip_breakpoint = false;

            self.execute_instruction(bus);

            if self.break_after_next {
                self.break_after_next = false;
                self.stopped_at_breakpoint = true;
                break;
            }
            if bus.suspend_pending() {
                self.suspended = true;
                break;
            }
        }

        u32::try_from(self.total_cycles.saturating_sub(end)).unwrap_or(u32::MAX)
    }

    /// Execute exactly one instruction (or wake from IDLE), ignoring the
    /// breakpoint address once.
    pub fn step<B: Bus>(&mut self, bus: &mut B) {
        self.run(bus, 1, true);
    }

    /// Take the level-1 interrupt: context switch through the vector,
    /// then drop the mask so the handler runs with interrupts off.
    fn take_interrupt<B: Bus>(&mut self, bus: &mut B) {
        self.idle = false;
        self.context_switch(bus, INTERRUPT_VECTOR);
        self.st &= !ST_INT_MASK;
        self.total_cycles += INTERRUPT_CYCLES;
    }

    /// BLWP-style context switch: load WP/PC from `vector`, save the old
    /// WP/PC/ST into the new workspace's R13-R15.
    pub(crate) fn context_switch<B: Bus>(&mut self, bus: &mut B, vector: u16) {
        let old_wp = self.wp;
        let old_pc = self.pc;
        self.wp = bus.read_word(vector);
        self.pc = bus.read_word(vector.wrapping_add(2));
        self.write_reg(bus, 13, old_wp);
        self.write_reg(bus, 14, old_pc);
        self.write_reg(bus, 15, self.st);
    }

    // === Register file access (registers live in memory at WP) ===

    #[must_use]
    pub(crate) fn reg_addr(&self, r: u16) -> u16 {
        self.wp.wrapping_add(r << 1)
    }

    pub(crate) fn read_reg<B: Bus>(&self, bus: &mut B, r: u16) -> u16 {
        bus.read_word(self.reg_addr(r))
    }

    pub(crate) fn write_reg<B: Bus>(&self, bus: &mut B, r: u16, value: u16) {
        bus.write_word(self.reg_addr(r), value);
    }

    // === Accessors ===

    /// Current workspace pointer.
    #[must_use]
    pub fn wp(&self) -> u16 {
        self.wp
    }

    /// Current status register.
    #[must_use]
    pub fn st(&self) -> u16 {
        self.st
    }

    /// Force the program counter (coprocessor start, test setup).
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc & 0xFFFE;
    }

    /// Force the workspace pointer (coprocessor start, test setup).
    pub fn set_wp(&mut self, wp: u16) {
        self.wp = wp & 0xFFFE;
    }

    /// Force the idle flag. The video coprocessor is stopped and started
    /// through this rather than through the interrupt line.
    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    /// Unrecognised opcodes executed since reset.
    #[must_use]
    pub fn illegal_ops(&self) -> u64 {
        self.illegal_ops
    }

    pub(crate) fn count_illegal_op(&mut self) {
        self.illegal_ops += 1;
    }

    pub(crate) fn add_cycles(&mut self, cycles: u64) {
        self.total_cycles += cycles;
    }
}

impl Default for Tms9900 {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionUnit for Tms9900 {
    fn pc(&self) -> u16 {
        self.pc
    }

    fn set_breakpoint(&mut self, addr: Option<u16>) {
        self.breakpoint = addr;
    }

    fn breakpoint(&self) -> Option<u16> {
        self.breakpoint
    }

    fn is_stopped_at_breakpoint(&self) -> bool {
        self.stopped_at_breakpoint
    }

    fn break_after_next(&mut self) {
        self.break_after_next = true;
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    fn is_idle(&self) -> bool {
        self.idle
    }

    fn cycles(&self) -> Ticks {
        Ticks::new(self.total_cycles)
    }
}

const TMS9900_QUERY_PATHS: &[&str] = &[
    "pc",
    "wp",
    "st",
    "flags.lgt",
    "flags.agt",
    "flags.eq",
    "flags.c",
    "flags.ov",
    "flags.op",
    "flags.x",
    "int_mask",
    "idle",
    "suspended",
    "illegal_ops",
    "cycles",
];

impl Observable for Tms9900 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(self.pc.into()),
            "wp" => Some(self.wp.into()),
            "st" => Some(self.st.into()),
            "flags.lgt" => Some((self.st & ST_LGT != 0).into()),
            "flags.agt" => Some((self.st & ST_AGT != 0).into()),
            "flags.eq" => Some((self.st & ST_EQ != 0).into()),
            "flags.c" => Some((self.st & ST_C != 0).into()),
            "flags.ov" => Some((self.st & ST_OV != 0).into()),
            "flags.op" => Some((self.st & ST_OP != 0).into()),
            "flags.x" => Some((self.st & ST_X != 0).into()),
            "int_mask" => Some(Value::U8((self.st & ST_INT_MASK) as u8)),
            "idle" => Some(self.idle.into()),
            "suspended" => Some(self.suspended.into()),
            "illegal_ops" => Some(self.illegal_ops.into()),
            "cycles" => Some(self.total_cycles.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        TMS9900_QUERY_PATHS
    }
}

impl Stateful for Tms9900 {
    fn get_state(&self) -> serde_json::Value {
        json!({
            "pc": self.pc,
            "wp": self.wp,
            "st": self.st,
            "idle": self.idle,
            "suspended": self.suspended,
            "cycles": self.total_cycles,
            "illegal_ops": self.illegal_ops,
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) {
        if let Some(pc) = state.get("pc").and_then(serde_json::Value::as_u64) {
            self.pc = pc as u16;
        }
        if let Some(wp) = state.get("wp").and_then(serde_json::Value::as_u64) {
            self.wp = wp as u16;
        }
        if let Some(st) = state.get("st").and_then(serde_json::Value::as_u64) {
            self.st = st as u16;
        }
        if let Some(idle) = state.get("idle").and_then(serde_json::Value::as_bool) {
            self.idle = idle;
        }
        if let Some(suspended) = state.get("suspended").and_then(serde_json::Value::as_bool) {
            self.suspended = suspended;
        }
        if let Some(cycles) = state.get("cycles").and_then(serde_json::Value::as_u64) {
            self.total_cycles = cycles;
        }
        if let Some(n) = state.get("illegal_ops").and_then(serde_json::Value::as_u64) {
            self.illegal_ops = n;
        }
    }
}
