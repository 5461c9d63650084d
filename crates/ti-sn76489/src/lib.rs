//! Texas Instruments SN76489 (TMS9919) Programmable Sound Generator.
//!
//! Three square-wave tone generators and a 15-bit LFSR noise channel,
//! each behind a 4-bit attenuator. The chip has a single write port: a
//! byte with bit 7 set latches a register number and carries a data
//! nibble; a byte with bit 7 clear supplies the upper six bits of the
//! latched tone period (attenuation and noise writes just repeat through
//! the nibble). Output is downsampled to the configured sample rate.
//!
//! # Register map (latched by bits 6-4 of a command byte)
//!
//! | Reg | Name               | Bits |
//! |-----|--------------------|------|
//! | 0   | Tone 1 period      | 9-0  |
//! | 1   | Tone 1 attenuation | 3-0  |
//! | 2   | Tone 2 period      | 9-0  |
//! | 3   | Tone 2 attenuation | 3-0  |
//! | 4   | Tone 3 period      | 9-0  |
//! | 5   | Tone 3 attenuation | 3-0  |
//! | 6   | Noise control      | 2-0  |
//! | 7   | Noise attenuation  | 3-0  |

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use emu_core::Stateful;
use serde_json::json;

/// Attenuator DAC levels: 2 dB per step, level 15 is full off.
const ATTENUATION_TABLE: [f32; 16] = [
    1.0000, 0.7943, 0.6310, 0.5012, 0.3981, 0.3162, 0.2512, 0.1995, 0.1585, 0.1259, 0.1000,
    0.0794, 0.0631, 0.0501, 0.0398, 0.0000,
];

/// LFSR seed after reset or a noise-control write (bit 14 set).
const LFSR_SEED: u16 = 0x4000;

/// A single tone generator (square wave with 10-bit period).
struct ToneGenerator {
    /// 10-bit period register.
    period: u16,
    /// Down-counter. Toggles output when it reaches 0.
    counter: u16,
    /// Current square wave output (true = high).
    output: bool,
}

impl ToneGenerator {
    fn new() -> Self {
        Self {
            period: 0,
            counter: 0,
            output: false,
        }
    }

    /// Clock one internal tick (called at `chip_clock` / 16).
    fn clock(&mut self) {
        if self.counter > 0 {
            self.counter -= 1;
        }
        if self.counter == 0 {
            self.counter = self.period.max(1);
            self.output = !self.output;
        }
    }
}

/// 15-bit LFSR noise generator.
struct NoiseGenerator {
    /// Control register value (bit 2 = white/periodic, bits 1-0 = rate).
    control: u8,
    /// Down-counter in internal-clock units.
    counter: u16,
    /// 15-bit LFSR state.
    lfsr: u16,
    /// Current noise output.
    output: bool,
}

impl NoiseGenerator {
    fn new() -> Self {
        Self {
            control: 0,
            counter: 0,
            lfsr: LFSR_SEED,
            output: false,
        }
    }

    /// Shift period in internal-clock units. Rate 3 tracks tone 3.
    fn period(&self, tone3_period: u16) -> u16 {
        match self.control & 0x03 {
            0 => 0x10,
            1 => 0x20,
            2 => 0x40,
            _ => tone3_period,
        }
    }

    /// Clock one internal tick (called at `chip_clock` / 16).
    fn clock(&mut self, tone3_period: u16) {
        if self.counter > 0 {
            self.counter -= 1;
        }
        if self.counter == 0 {
            self.counter = self.period(tone3_period).max(1);
            let feedback = if self.control & 0x04 != 0 {
                // White noise: taps 0 and 1
                (self.lfsr ^ (self.lfsr >> 1)) & 1
            } else {
                // Periodic: tap 0 only
                self.lfsr & 1
            };
            self.lfsr = (self.lfsr >> 1) | (feedback << 14);
            self.output = self.lfsr & 1 != 0;
        }
    }
}

/// SN76489 Programmable Sound Generator.
pub struct Sn76489 {
    /// Register latched by the last command byte (0-7).
    latched_reg: u8,
    tone: [ToneGenerator; 3],
    noise: NoiseGenerator,
    /// Per-channel attenuation (tones 1-3, then noise).
    attenuation: [u8; 4],
    /// Host mute. The chip keeps clocking; the mixer outputs silence.
    mute: bool,

    /// Internal clock divider counter.
    clock_counter: u32,

    // Downsampling state
    accumulator: f32,
    sample_count: u32,
    ticks_per_sample: f32,
    buffer: Vec<f32>,
}

impl Sn76489 {
    /// Create a new SN76489.
    ///
    /// `clock_freq` is the chip input clock in Hz (3,579,545 in the
    /// console). `sample_rate` is the audio output rate (typically
    /// 48,000).
    #[must_use]
    pub fn new(clock_freq: u32, sample_rate: u32) -> Self {
        Self {
            latched_reg: 0,
            tone: [ToneGenerator::new(), ToneGenerator::new(), ToneGenerator::new()],
            noise: NoiseGenerator::new(),
            attenuation: [0x0F; 4],
            mute: false,
            clock_counter: 0,
            accumulator: 0.0,
            sample_count: 0,
            ticks_per_sample: clock_freq as f32 / sample_rate as f32,
            buffer: Vec::with_capacity(sample_rate as usize / 50 + 1),
        }
    }

    /// Reset to power-on state: all channels attenuated to silence.
    pub fn reset(&mut self) {
        self.latched_reg = 0;
        for tone in &mut self.tone {
            tone.period = 0;
            tone.counter = 0;
            tone.output = false;
        }
        self.noise = NoiseGenerator::new();
        self.attenuation = [0x0F; 4];
        self.clock_counter = 0;
        self.accumulator = 0.0;
        self.sample_count = 0;
        self.buffer.clear();
    }

    /// Write one command byte to the chip's port.
    pub fn write_data(&mut self, value: u8) {
        if value & 0x80 != 0 {
            // Latch byte: register number plus a data nibble
            let reg = (value >> 4) & 0x07;
            self.latched_reg = reg;
            let nibble = value & 0x0F;
            match reg {
                0 | 2 | 4 => {
                    let tone = &mut self.tone[usize::from(reg >> 1)];
                    tone.period = (tone.period & 0x3F0) | u16::from(nibble);
                }
                6 => {
                    self.noise.control = value & 0x07;
                    self.noise.lfsr = LFSR_SEED;
                }
                _ => self.attenuation[usize::from(reg >> 1)] = nibble,
            }
        } else {
            // Data byte: upper six bits for the latched tone period;
            // attenuation and noise writes repeat through the low bits
            match self.latched_reg {
                0 | 2 | 4 => {
                    let tone = &mut self.tone[usize::from(self.latched_reg >> 1)];
                    tone.period = (tone.period & 0x00F) | (u16::from(value & 0x3F) << 4);
                }
                6 => {
                    self.noise.control = value & 0x07;
                    self.noise.lfsr = LFSR_SEED;
                }
                _ => self.attenuation[usize::from(self.latched_reg >> 1)] = value & 0x0F,
            }
        }
    }

    /// Mute or unmute the mixer output.
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// True while the host has the chip muted.
    #[must_use]
    pub fn is_mute(&self) -> bool {
        self.mute
    }

    /// Advance the chip by one input clock cycle.
    pub fn tick(&mut self) {
        self.clock_counter += 1;

        // Generators clock at input / 16
        if self.clock_counter.is_multiple_of(16) {
            for tone in &mut self.tone {
                tone.clock();
            }
            self.noise.clock(self.tone[2].period);
        }

        self.accumulator += self.mix();
        self.sample_count += 1;

        if self.sample_count as f32 >= self.ticks_per_sample {
            let n = self.sample_count as f32;
            self.buffer.push(self.accumulator / n);
            self.accumulator = 0.0;
            self.sample_count = 0;
        }
    }

    /// Advance by a batch of input clock cycles.
    pub fn run(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    /// Mix the four channels into one centred sample.
    fn mix(&self) -> f32 {
        if self.mute {
            return 0.0;
        }
        let mut sample = 0.0f32;
        for (ch, tone) in self.tone.iter().enumerate() {
            let amplitude = ATTENUATION_TABLE[usize::from(self.attenuation[ch])];
            let level = if tone.output { amplitude } else { 0.0 };
            sample += level - amplitude * 0.5;
        }
        let amplitude = ATTENUATION_TABLE[usize::from(self.attenuation[3])];
        let level = if self.noise.output { amplitude } else { 0.0 };
        sample += level - amplitude * 0.5;

        // Four channels at ±0.5 max excursion
        sample / 2.0
    }

    /// Take the mono audio output buffer (drains it).
    pub fn take_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.buffer)
    }

    /// Number of samples in the output buffer.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Stateful for Sn76489 {
    fn get_state(&self) -> serde_json::Value {
        json!({
            "latchedRegister": self.latched_reg,
            "tonePeriods": [self.tone[0].period, self.tone[1].period, self.tone[2].period],
            "attenuation": self.attenuation.to_vec(),
            "noiseControl": self.noise.control,
            "lfsr": self.noise.lfsr,
            "mute": self.mute,
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) {
        if let Some(reg) = state.get("latchedRegister").and_then(serde_json::Value::as_u64) {
            self.latched_reg = reg as u8 & 0x07;
        }
        if let Some(periods) = state.get("tonePeriods").and_then(serde_json::Value::as_array) {
            for (tone, v) in self.tone.iter_mut().zip(periods) {
                if let Some(p) = v.as_u64() {
                    tone.period = p as u16 & 0x3FF;
                    tone.counter = 0;
                }
            }
        }
        if let Some(att) = state.get("attenuation").and_then(serde_json::Value::as_array) {
            for (slot, v) in self.attenuation.iter_mut().zip(att) {
                if let Some(a) = v.as_u64() {
                    *slot = a as u8 & 0x0F;
                }
            }
        }
        if let Some(ctrl) = state.get("noiseControl").and_then(serde_json::Value::as_u64) {
            self.noise.control = ctrl as u8 & 0x07;
        }
        if let Some(lfsr) = state.get("lfsr").and_then(serde_json::Value::as_u64) {
            self.noise.lfsr = lfsr as u16 & 0x7FFF;
        }
        if let Some(mute) = state.get("mute").and_then(serde_json::Value::as_bool) {
            self.mute = mute;
        }
    }
}
