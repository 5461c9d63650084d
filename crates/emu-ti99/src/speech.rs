//! TMS5200 speech synthesizer, modelled at its bus interface.
//!
//! The LPC lattice itself is out of scope: what the rest of the machine
//! observes is the command register, the 16-byte speak-external FIFO, the
//! status byte and the ready line. A full FIFO drops ready, which the bus
//! turns into a CPU suspension until the chip drains.

use std::collections::VecDeque;

use emu_core::{Stateful, state_bytes, state_get_bytes};
use serde_json::{Value, json};

/// Speak-external FIFO depth in bytes.
pub const FIFO_CAPACITY: usize = 16;

/// Status bit: currently producing speech.
pub const STATUS_TALK: u8 = 0x80;
/// Status bit: FIFO less than half full.
pub const STATUS_BUFFER_LOW: u8 = 0x40;
/// Status bit: FIFO empty.
pub const STATUS_BUFFER_EMPTY: u8 = 0x20;

// One FIFO byte is consumed every 16 scanlines while talking externally,
// about 8 kbit/s at 60 frames of 262 lines.
const DRAIN_SCANLINES: u32 = 16;

// Canned vocabulary phrases play as a fixed two-frame talk pulse.
const SPEAK_SCANLINES: u32 = 524;

/// The speech synthesizer's bus-visible state machine.
pub struct Tms5200 {
    rom: Vec<u8>,
    fifo: VecDeque<u8>,
    address: u32,
    talking: bool,
    speak_external: bool,
    talk_countdown: u32,
    drain_counter: u32,
    read_pending: Option<u8>,
    ready: bool,
}

impl Tms5200 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rom: Vec::new(),
            fifo: VecDeque::with_capacity(FIFO_CAPACITY),
            address: 0,
            talking: false,
            speak_external: false,
            talk_countdown: 0,
            drain_counter: 0,
            read_pending: None,
            ready: true,
        }
    }

    /// Install the vocabulary ROM served by read-byte commands.
    pub fn load_rom(&mut self, data: Vec<u8>) {
        self.rom = data;
    }

    pub fn reset(&mut self) {
        self.fifo.clear();
        self.address = 0;
        self.talking = false;
        self.speak_external = false;
        self.talk_countdown = 0;
        self.drain_counter = 0;
        self.read_pending = None;
        self.ready = true;
    }

    /// Write to the speech port. During speak-external every byte is FIFO
    /// data; otherwise the top nibble selects a command.
    pub fn write_data(&mut self, value: u8) {
        if self.speak_external {
            self.fifo.push_back(value);
            if self.fifo.len() >= FIFO_CAPACITY {
                self.ready = false;
            }
            return;
        }
        match value >> 4 {
            0x1 => {
                // Read byte: serve one ROM byte at the address counter.
                let byte = self
                    .rom
                    .get(self.address as usize)
                    .copied()
                    .unwrap_or(0);
                self.read_pending = Some(byte);
                self.address = self.address.wrapping_add(1) & 0xF_FFFF;
            }
            0x4 => {
                // Load address: five successive nibble loads build the
                // 20-bit ROM address.
                self.address = ((self.address << 4) | u32::from(value & 0x0F)) & 0xF_FFFF;
            }
            0x5 => {
                self.talking = true;
                self.speak_external = false;
                self.talk_countdown = SPEAK_SCANLINES;
            }
            0x6 => {
                self.talking = true;
                self.speak_external = true;
                self.drain_counter = 0;
            }
            _ => {}
        }
    }

    /// Read the speech port: the byte fetched by a read-byte command if one
    /// is pending, otherwise the status register.
    pub fn read(&mut self) -> u8 {
        if let Some(byte) = self.read_pending.take() {
            return byte;
        }
        self.status()
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        let mut status = 0;
        if self.talking {
            status |= STATUS_TALK;
        }
        if self.fifo.len() < FIFO_CAPACITY / 2 {
            status |= STATUS_BUFFER_LOW;
        }
        if self.fifo.is_empty() {
            status |= STATUS_BUFFER_EMPTY;
        }
        status
    }

    /// The ready line. Low while the FIFO is full; the bus suspends the
    /// CPU on writes until it rises again.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn is_talking(&self) -> bool {
        self.talking
    }

    /// Advance the chip by one scanline.
    pub fn tick_scanline(&mut self) {
        if !self.talking {
            return;
        }
        if self.speak_external {
            self.drain_counter += 1;
            if self.drain_counter >= DRAIN_SCANLINES {
                self.drain_counter = 0;
                self.fifo.pop_front();
                if self.fifo.len() < FIFO_CAPACITY {
                    self.ready = true;
                }
                if self.fifo.is_empty() {
                    self.talking = false;
                    self.speak_external = false;
                }
            }
        } else {
            self.talk_countdown = self.talk_countdown.saturating_sub(1);
            if self.talk_countdown == 0 {
                self.talking = false;
            }
        }
    }
}

impl Default for Tms5200 {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Tms5200 {
    fn get_state(&self) -> Value {
        let fifo: Vec<u8> = self.fifo.iter().copied().collect();
        json!({
            "fifo": state_bytes(&fifo),
            "address": self.address,
            "talking": self.talking,
            "speakExternal": self.speak_external,
            "talkCountdown": self.talk_countdown,
            "drainCounter": self.drain_counter,
            "ready": self.ready,
        })
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(fifo) = state_get_bytes(state, "fifo") {
            self.fifo = fifo.into_iter().collect();
        }
        if let Some(address) = state.get("address").and_then(Value::as_u64) {
            self.address = address as u32;
        }
        if let Some(talking) = state.get("talking").and_then(Value::as_bool) {
            self.talking = talking;
        }
        if let Some(ext) = state.get("speakExternal").and_then(Value::as_bool) {
            self.speak_external = ext;
        }
        if let Some(count) = state.get("talkCountdown").and_then(Value::as_u64) {
            self.talk_countdown = count as u32;
        }
        if let Some(count) = state.get("drainCounter").and_then(Value::as_u64) {
            self.drain_counter = count as u32;
        }
        if let Some(ready) = state.get("ready").and_then(Value::as_bool) {
            self.ready = ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_status_is_buffer_low_and_empty() {
        let speech = Tms5200::new();
        assert_eq!(speech.status(), STATUS_BUFFER_LOW | STATUS_BUFFER_EMPTY);
        assert!(speech.ready());
    }

    #[test]
    fn speak_external_consumes_fifo_over_scanlines() {
        let mut speech = Tms5200::new();
        speech.write_data(0x60);
        assert!(speech.is_talking());
        speech.write_data(0xAA);
        speech.write_data(0xBB);
        assert_eq!(speech.status() & STATUS_BUFFER_EMPTY, 0);

        for _ in 0..32 {
            speech.tick_scanline();
        }
        assert_eq!(speech.status() & STATUS_BUFFER_EMPTY, STATUS_BUFFER_EMPTY);
        assert!(!speech.is_talking());
    }

    #[test]
    fn full_fifo_drops_ready_until_drained() {
        let mut speech = Tms5200::new();
        speech.write_data(0x60);
        for i in 0..FIFO_CAPACITY {
            speech.write_data(i as u8);
        }
        assert!(!speech.ready());

        for _ in 0..16 {
            speech.tick_scanline();
        }
        assert!(speech.ready());
    }

    #[test]
    fn read_byte_serves_rom_at_loaded_address() {
        let mut speech = Tms5200::new();
        speech.load_rom(vec![0x11, 0x22, 0x33, 0x44]);
        // Five nibble loads: address 0x00002.
        for nibble in [0x40, 0x40, 0x40, 0x40, 0x42] {
            speech.write_data(nibble);
        }
        speech.write_data(0x10);
        assert_eq!(speech.read(), 0x33);
        speech.write_data(0x10);
        assert_eq!(speech.read(), 0x44);
        // No pending byte: reads fall back to status.
        assert_eq!(speech.read() & STATUS_BUFFER_EMPTY, STATUS_BUFFER_EMPTY);
    }

    #[test]
    fn speak_command_raises_talk_for_a_fixed_window() {
        let mut speech = Tms5200::new();
        speech.write_data(0x50);
        assert_eq!(speech.status() & STATUS_TALK, STATUS_TALK);
        for _ in 0..SPEAK_SCANLINES {
            speech.tick_scanline();
        }
        assert_eq!(speech.status() & STATUS_TALK, 0);
    }

    #[test]
    fn state_round_trips() {
        let mut speech = Tms5200::new();
        speech.write_data(0x60);
        speech.write_data(0x12);
        speech.write_data(0x34);

        let state = speech.get_state();
        let mut restored = Tms5200::new();
        restored.restore_state(&state);
        assert!(restored.is_talking());
        assert_eq!(restored.status(), speech.status());
    }
}
