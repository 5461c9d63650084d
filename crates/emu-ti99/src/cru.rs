//! TMS9901 programmable systems interface.
//!
//! The 9901 sits on the CRU bus at bits 0-31 and multiplexes three jobs:
//! interrupt masking/latching for the VDP (INT2) and its own timer (INT3),
//! the keyboard column scan, and the cassette control lines. Bit 0 flips
//! the chip between I/O mode and timer mode; in timer mode bits 1-14
//! address the 14-bit clock register and decrementer instead of the
//! interrupt mask.

use emu_core::Stateful;
use serde_json::{Value, json};

use crate::keyboard::Keyboard;
use crate::tape::Tape;

// The decrementer is clocked at 3MHz/64 ~ 46.9kHz, three ticks per scanline.
const TIMER_DECREMENTS_PER_SCANLINE: u16 = 3;

/// The 9901 plus the devices wired to its I/O pins.
pub struct Cru {
    outputs: [bool; 32],
    timer_mode: bool,
    clock_register: u16,
    decrementer: u16,
    timer_running: bool,
    timer_interrupt: bool,
    interrupt_mask: u16,
    keyboard: Keyboard,
    tape: Tape,
}

impl Cru {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outputs: [false; 32],
            timer_mode: false,
            clock_register: 0,
            decrementer: 0,
            timer_running: false,
            timer_interrupt: false,
            interrupt_mask: 0,
            keyboard: Keyboard::new(),
            tape: Tape::new(),
        }
    }

    pub fn reset(&mut self) {
        self.outputs = [false; 32];
        self.timer_mode = false;
        self.clock_register = 0;
        self.decrementer = 0;
        self.timer_running = false;
        self.timer_interrupt = false;
        self.interrupt_mask = 0;
        self.keyboard.reset();
        self.tape.reset();
    }

    /// Read one CRU bit. Bit 2 (the VDP interrupt pin) is resolved by the
    /// bus, which sees the VDP; here it reads inactive.
    pub fn read_bit(&mut self, bit: u16) -> bool {
        if self.timer_mode && (1..=14).contains(&bit) {
            return self.decrementer & (1 << (bit - 1)) != 0;
        }
        match bit {
            0 => self.timer_mode,
            3..=10 => {
                let column = u8::from(self.outputs[18])
                    | u8::from(self.outputs[19]) << 1
                    | u8::from(self.outputs[20]) << 2;
                let row = (bit - 3) as u8;
                // Rows read active low. The alpha-lock switch shares the
                // bit-7 line when its select output (bit 21) is low.
                let mut value = !self.keyboard.is_pressed(column, row);
                if bit == 7 && !self.outputs[21] && self.keyboard.alpha_lock() {
                    value = false;
                }
                value
            }
            27 => self.tape.read_bit(),
            16..=31 => self.outputs[bit as usize],
            _ => true,
        }
    }

    /// Write one CRU bit.
    pub fn write_bit(&mut self, bit: u16, value: bool) {
        if bit == 0 {
            let was_timer_mode = self.timer_mode;
            self.timer_mode = value;
            if was_timer_mode && !value && self.clock_register != 0 {
                // Leaving timer mode starts the countdown.
                self.decrementer = self.clock_register;
                self.timer_running = true;
            }
            return;
        }
        if self.timer_mode && (1..=14).contains(&bit) {
            let mask = 1 << (bit - 1);
            if value {
                self.clock_register |= mask;
            } else {
                self.clock_register &= !mask;
            }
            return;
        }
        match bit {
            1..=15 => {
                let mask = 1 << bit;
                if value {
                    self.interrupt_mask |= mask;
                } else {
                    self.interrupt_mask &= !mask;
                }
                if bit == 3 {
                    // Writing the timer mask acknowledges the interrupt.
                    self.timer_interrupt = false;
                }
            }
            16..=31 => {
                self.outputs[bit as usize] = value;
                match bit {
                    22 => self.tape.set_motor(value),
                    23 => self.tape.set_audio_gate(value),
                    24 => self.tape.write_bit(value),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    /// True while bit 0 has switched bits 1-14 over to the clock register.
    #[must_use]
    pub fn timer_mode(&self) -> bool {
        self.timer_mode
    }

    /// Advance the timer and the tape stream by one scanline.
    pub fn tick_scanline(&mut self) {
        self.tape.tick_scanline();
        if !self.timer_running {
            return;
        }
        if self.decrementer <= TIMER_DECREMENTS_PER_SCANLINE {
            self.decrementer = self.clock_register;
            self.timer_interrupt = true;
        } else {
            self.decrementer -= TIMER_DECREMENTS_PER_SCANLINE;
        }
    }

    /// Whether a masked interrupt source is asserting INTREQ.
    #[must_use]
    pub fn interrupt_pending(&self, vdp_interrupt: bool) -> bool {
        (self.interrupt_mask & (1 << 2) != 0 && vdp_interrupt)
            || (self.interrupt_mask & (1 << 3) != 0 && self.timer_interrupt)
    }

    #[must_use]
    pub fn timer_interrupt(&self) -> bool {
        self.timer_interrupt
    }

    #[must_use]
    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }

    #[must_use]
    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn tape_mut(&mut self) -> &mut Tape {
        &mut self.tape
    }
}

impl Default for Cru {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Cru {
    fn get_state(&self) -> Value {
        let outputs: Vec<bool> = self.outputs.to_vec();
        json!({
            "outputs": outputs,
            "timerMode": self.timer_mode,
            "clockRegister": self.clock_register,
            "decrementer": self.decrementer,
            "timerRunning": self.timer_running,
            "timerInterrupt": self.timer_interrupt,
            "interruptMask": self.interrupt_mask,
        })
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(outputs) = state.get("outputs").and_then(Value::as_array) {
            for (i, value) in outputs.iter().take(32).enumerate() {
                self.outputs[i] = value.as_bool().unwrap_or(false);
            }
        }
        if let Some(mode) = state.get("timerMode").and_then(Value::as_bool) {
            self.timer_mode = mode;
        }
        if let Some(clock) = state.get("clockRegister").and_then(Value::as_u64) {
            self.clock_register = clock as u16;
        }
        if let Some(dec) = state.get("decrementer").and_then(Value::as_u64) {
            self.decrementer = dec as u16;
        }
        if let Some(running) = state.get("timerRunning").and_then(Value::as_bool) {
            self.timer_running = running;
        }
        if let Some(int) = state.get("timerInterrupt").and_then(Value::as_bool) {
            self.timer_interrupt = int;
        }
        if let Some(mask) = state.get("interruptMask").and_then(Value::as_u64) {
            self.interrupt_mask = mask as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_counts_down_and_latches_an_interrupt() {
        let mut cru = Cru::new();
        cru.write_bit(0, true);
        // Clock register = 9: three scanlines to expiry.
        cru.write_bit(1, true);
        cru.write_bit(4, true);
        cru.write_bit(0, false);
        cru.write_bit(3, true);

        cru.tick_scanline();
        cru.tick_scanline();
        assert!(!cru.timer_interrupt());
        cru.tick_scanline();
        assert!(cru.timer_interrupt());
        assert!(cru.interrupt_pending(false));

        // Acknowledge by rewriting the mask bit; the decrementer reloaded.
        cru.write_bit(3, true);
        assert!(!cru.timer_interrupt());
        cru.write_bit(0, true);
        assert!(cru.read_bit(1));
        assert!(cru.read_bit(4));
    }

    #[test]
    fn timer_mode_reads_expose_the_decrementer() {
        let mut cru = Cru::new();
        cru.write_bit(0, true);
        cru.write_bit(2, true);
        cru.write_bit(0, false);
        cru.write_bit(0, true);
        // Decrementer loaded with 2: bit 2 set, bit 1 clear.
        assert!(cru.read_bit(2));
        assert!(!cru.read_bit(1));
        assert!(cru.read_bit(0));
    }

    #[test]
    fn keyboard_rows_read_active_low_for_the_selected_column() {
        let mut cru = Cru::new();
        cru.keyboard_mut().set_key(5, 2, true);

        // Column 5 = binary 101 on the select outputs.
        cru.write_bit(18, true);
        cru.write_bit(19, false);
        cru.write_bit(20, true);
        assert!(!cru.read_bit(5));
        assert!(cru.read_bit(6));

        cru.write_bit(18, false);
        assert!(cru.read_bit(5));
    }

    #[test]
    fn alpha_lock_pulls_bit_7_low_when_selected() {
        let mut cru = Cru::new();
        cru.keyboard_mut().set_alpha_lock(true);
        cru.write_bit(21, false);
        assert!(!cru.read_bit(7));

        cru.write_bit(21, true);
        assert!(cru.read_bit(7));

        cru.write_bit(21, false);
        cru.keyboard_mut().set_alpha_lock(false);
        assert!(cru.read_bit(7));
    }

    #[test]
    fn vdp_interrupt_respects_the_mask() {
        let mut cru = Cru::new();
        assert!(!cru.interrupt_pending(true));
        cru.write_bit(2, true);
        assert!(cru.interrupt_pending(true));
        assert!(!cru.interrupt_pending(false));
    }

    #[test]
    fn cassette_lines_drive_the_tape() {
        let mut cru = Cru::new();
        cru.write_bit(22, true);
        assert!(cru.tape().motor());
        cru.write_bit(24, true);
        cru.tape_mut().tick_scanline();
        cru.write_bit(24, false);
        assert_eq!(cru.tape().recorded(), &[(0, true), (3, false)]);

        cru.tape_mut().load_input(vec![true]);
        assert!(cru.read_bit(27));
    }

    #[test]
    fn state_round_trips() {
        let mut cru = Cru::new();
        cru.write_bit(0, true);
        cru.write_bit(3, true);
        cru.write_bit(0, false);
        cru.write_bit(2, true);
        cru.write_bit(18, true);
        cru.tick_scanline();

        let state = cru.get_state();
        let mut restored = Cru::new();
        restored.restore_state(&state);
        assert_eq!(restored.get_state(), state);
    }
}
