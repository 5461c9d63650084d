//! Cassette interface.
//!
//! The CRU controller drives the motor, audio gate and output level; the
//! CPU polls the input bit. Tape data is a 1-bit stream sampled at the
//! CRU timer rate (three samples per scanline), with writes captured as
//! level transitions.

use emu_core::{Stateful, state_bytes, state_get_bytes};
use serde_json::{Value, json};

// Stream samples consumed per scanline while the motor runs.
const SAMPLES_PER_SCANLINE: u64 = 3;

/// The cassette deck.
pub struct Tape {
    motor: bool,
    audio_gate: bool,
    paused: bool,
    position: u64,
    last_level: bool,
    input: Vec<bool>,
    recorded: Vec<(u64, bool)>,
}

impl Tape {
    #[must_use]
    pub fn new() -> Self {
        Self {
            motor: false,
            audio_gate: false,
            paused: false,
            position: 0,
            last_level: false,
            input: Vec::new(),
            recorded: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.motor = false;
        self.audio_gate = false;
        self.position = 0;
        self.last_level = false;
    }

    /// Load a 1-bit input stream and rewind to its start.
    pub fn load_input(&mut self, samples: Vec<bool>) {
        self.input = samples;
        self.position = 0;
    }

    /// Level transitions captured from CRU writes, as (position, level).
    #[must_use]
    pub fn recorded(&self) -> &[(u64, bool)] {
        &self.recorded
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_motor(&mut self, on: bool) {
        self.motor = on;
    }

    #[must_use]
    pub fn motor(&self) -> bool {
        self.motor
    }

    pub fn set_audio_gate(&mut self, open: bool) {
        self.audio_gate = open;
    }

    #[must_use]
    pub fn audio_gate(&self) -> bool {
        self.audio_gate
    }

    /// Host-side pause: the motor line stays asserted but the stream
    /// stops advancing.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Write the output level; a change is recorded as a transition at
    /// the current position.
    pub fn write_bit(&mut self, level: bool) {
        if level != self.last_level {
            self.recorded.push((self.position, level));
            self.last_level = level;
        }
    }

    /// The input level at the current position; silence past the end.
    #[must_use]
    pub fn read_bit(&self) -> bool {
        self.input
            .get(usize::try_from(self.position).unwrap_or(usize::MAX))
            .copied()
            .unwrap_or(false)
    }

    /// Advance the stream by one scanline's worth of samples.
    pub fn tick_scanline(&mut self) {
        if self.motor && !self.paused {
            self.position += SAMPLES_PER_SCANLINE;
        }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Tape {
    fn get_state(&self) -> Value {
        let mut packed = vec![0u8; self.input.len().div_ceil(8)];
        for (i, &bit) in self.input.iter().enumerate() {
            if bit {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        let recorded: Vec<Value> = self
            .recorded
            .iter()
            .map(|&(pos, level)| json!([pos, level]))
            .collect();
        json!({
            "motor": self.motor,
            "audioGate": self.audio_gate,
            "paused": self.paused,
            "position": self.position,
            "lastLevel": self.last_level,
            "inputLength": self.input.len(),
            "input": state_bytes(&packed),
            "recorded": recorded,
        })
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(motor) = state.get("motor").and_then(Value::as_bool) {
            self.motor = motor;
        }
        if let Some(gate) = state.get("audioGate").and_then(Value::as_bool) {
            self.audio_gate = gate;
        }
        if let Some(paused) = state.get("paused").and_then(Value::as_bool) {
            self.paused = paused;
        }
        if let Some(position) = state.get("position").and_then(Value::as_u64) {
            self.position = position;
        }
        if let Some(level) = state.get("lastLevel").and_then(Value::as_bool) {
            self.last_level = level;
        }
        if let Some(length) = state.get("inputLength").and_then(Value::as_u64) {
            if let Some(packed) = state_get_bytes(state, "input") {
                let length = length as usize;
                self.input = (0..length)
                    .map(|i| packed.get(i / 8).is_some_and(|byte| byte & (1 << (i % 8)) != 0))
                    .collect();
            }
        }
        if let Some(recorded) = state.get("recorded").and_then(Value::as_array) {
            self.recorded = recorded
                .iter()
                .filter_map(|entry| {
                    let pair = entry.as_array()?;
                    Some((pair.first()?.as_u64()?, pair.get(1)?.as_bool()?))
                })
                .collect();
        }
    }
}
