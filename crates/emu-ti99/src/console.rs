//! Machine assembly and the frame scheduler.
//!
//! A frame is 262 scanline steps. Each step renders one line, gives the
//! CPU a cycle budget (carrying any overrun into the next line), gives
//! the video coprocessor its own budget when one is awake, then ticks
//! the bus devices. Cycle accounting is nominal per line: overrun only
//! shifts which line absorbs the deficit, never the frame total, so
//! video timing stays deterministic relative to scanline count.
//!
//! A breakpoint halt is a deliberate early return, not an error: the
//! scheduler stops mid-frame with the line phase preserved and the next
//! `run_frame` resumes exactly where it left off.

use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use emu_core::{Bus, ExecutionUnit, ExecutionUnitId, Observable, Stateful, Value};
use serde_json::{Value as Json, json};
use ti_sn76489::Sn76489;
use ti_tms9900::Tms9900;
use ti_tms9918::{FB_HEIGHT, VideoProcessor};

use crate::cards::{CardSlot, LoopbackTransport, TiFdc, TipiCard};
use crate::config::{DiskControllerKind, Ti99Config};
use crate::input::InputQueue;
use crate::memory::Memory;

/// Nominal CPU cycles per scanline (3MHz over 262 lines at 60Hz).
pub const CYCLES_PER_SCANLINE: u32 = 190;
/// Scanline steps per frame.
pub const SCANLINES_PER_FRAME: u32 = 262;
/// Video coprocessor cycles per scanline (100MHz core).
pub const GPU_CYCLES_PER_SCANLINE: u32 = 6361;
/// PSG input clock, the NTSC colourburst frequency.
pub const PSG_CLOCK: u32 = 3_579_545;
/// Host audio sample rate.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

// Fast mode multiplies both execution budgets.
const FAST_MULTIPLIER: u32 = 3;

// Scanline cycle counts buffered for a slow accounting consumer.
const CYCLE_FEED_DEPTH: usize = 1024;

/// Outcome of one `run_frame` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResult {
    /// The unit stopped at a breakpoint, if the frame ended early.
    pub halted_at: Option<ExecutionUnitId>,
    /// Nominal cycles accounted during this call.
    pub cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinePhase {
    Draw,
    Cpu,
    Gpu,
}

/// The assembled console.
pub struct Ti99 {
    cpu: Tms9900,
    memory: Memory,
    input: InputQueue,
    running: bool,
    frame_count: u64,
    next_scanline: u32,
    line_phase: LinePhase,
    extra_cycles: u32,
    active_unit: ExecutionUnitId,
    cycles_per_scanline: u32,
    gpu_cycles_per_scanline: u32,
    cycle_feed: Option<SyncSender<u32>>,
}

impl Ti99 {
    #[must_use]
    pub fn new(config: &Ti99Config) -> Self {
        let mut memory = Memory::new(config);
        if config.disk == DiskControllerKind::TiFdc {
            let dsr = config.fdc_dsr.clone().unwrap_or_default();
            memory
                .register_card(CardSlot::Fdc(TiFdc::new(dsr)))
                .expect("cards built from config use distinct CRU bases");
        }
        if config.bridge {
            let dsr = config.bridge_dsr.clone().unwrap_or_default();
            let transport = Box::new(LoopbackTransport::new());
            memory
                .register_card(CardSlot::Bridge(TipiCard::new(dsr, transport)))
                .expect("cards built from config use distinct CRU bases");
        }
        let multiplier = if config.fast { FAST_MULTIPLIER } else { 1 };
        let mut machine = Self {
            cpu: Tms9900::new(),
            memory,
            input: InputQueue::new(),
            running: false,
            frame_count: 0,
            next_scanline: 0,
            line_phase: LinePhase::Draw,
            extra_cycles: 0,
            active_unit: ExecutionUnitId::Cpu,
            cycles_per_scanline: CYCLES_PER_SCANLINE * multiplier,
            gpu_cycles_per_scanline: GPU_CYCLES_PER_SCANLINE * multiplier,
            cycle_feed: None,
        };
        machine.reset();
        machine
    }

    /// Hardware reset: every subsystem back to power-on state, then the
    /// CPU vectors in through 0x0000.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.cpu = Tms9900::new();
        self.cpu.reset(&mut self.memory);
        self.frame_count = 0;
        self.next_scanline = 0;
        self.line_phase = LinePhase::Draw;
        self.extra_cycles = 0;
        self.active_unit = ExecutionUnitId::Cpu;
    }

    pub fn start(&mut self) {
        self.running = true;
        self.memory.psg_mut().set_mute(false);
    }

    /// Stop the run loop and mute audio synchronously.
    pub fn stop(&mut self) {
        self.running = false;
        self.memory.psg_mut().set_mute(true);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one frame, or resume a frame halted at a breakpoint.
    ///
    /// `skip_breakpoint` suppresses the breakpoint match for the first
    /// line's execution so a halted unit can run off its own address.
    pub fn run_frame(&mut self, skip_breakpoint: bool) -> FrameResult {
        let mut skip = skip_breakpoint;
        let mut nominal: u64 = 0;
        if self.next_scanline == 0 && self.line_phase == LinePhase::Draw {
            let frame = self.frame_count;
            let memory = &mut self.memory;
            self.input.process(frame, |column, row, pressed| {
                memory.cru_mut().keyboard_mut().set_key(column, row, pressed);
            });
        }
        while self.next_scanline < SCANLINES_PER_FRAME {
            let y = self.next_scanline;
            if self.line_phase == LinePhase::Draw {
                if y == 0 {
                    self.memory.vdp_mut().init_frame();
                }
                if y < FB_HEIGHT {
                    self.memory.vdp_mut().draw_scanline(y);
                } else {
                    self.memory.vdp_mut().draw_invisible_scanline(y);
                }
                self.line_phase = LinePhase::Cpu;
            }
            if self.line_phase == LinePhase::Cpu {
                if !self.cpu.is_suspended() {
                    let budget = self.cycles_per_scanline.saturating_sub(self.extra_cycles);
                    self.extra_cycles = self.cpu.run(&mut self.memory, budget, skip);
                    if self.cpu.is_stopped_at_breakpoint() {
                        self.active_unit = ExecutionUnitId::Cpu;
                        return FrameResult {
                            halted_at: Some(ExecutionUnitId::Cpu),
                            cycles: nominal,
                        };
                    }
                }
                self.line_phase = LinePhase::Gpu;
            }
            if self.gpu_awake() {
                self.active_unit = ExecutionUnitId::Gpu;
                let budget = self.gpu_cycles_per_scanline;
                self.memory.vdp_mut().run_gpu(budget, skip);
                if self.gpu_halted() {
                    return FrameResult {
                        halted_at: Some(ExecutionUnitId::Gpu),
                        cycles: nominal,
                    };
                }
                if !self.gpu_awake() {
                    self.active_unit = ExecutionUnitId::Cpu;
                }
            }

            self.memory.tick_scanline();
            // A suspension lifts as soon as its cause clears; the CPU
            // rejoins on the next line.
            if self.cpu.is_suspended() && !self.memory.suspend_pending() {
                self.cpu.set_suspended(false);
            }
            if let Some(feed) = &self.cycle_feed {
                let _ = feed.try_send(self.cycles_per_scanline);
            }
            nominal += u64::from(self.cycles_per_scanline);
            skip = false;
            self.line_phase = LinePhase::Draw;
            self.next_scanline += 1;
        }
        self.memory.vdp_mut().update_canvas();
        self.frame_count += 1;
        self.next_scanline = 0;
        FrameResult {
            halted_at: None,
            cycles: nominal,
        }
    }

    fn gpu_awake(&mut self) -> bool {
        self.memory
            .vdp_mut()
            .gpu_mut()
            .is_some_and(|gpu| !gpu.is_idle())
    }

    fn gpu_halted(&mut self) -> bool {
        self.memory
            .vdp_mut()
            .gpu_mut()
            .is_some_and(|gpu| gpu.is_stopped_at_breakpoint())
    }

    /// Run exactly one cycle on the active execution unit.
    pub fn step(&mut self) {
        match self.active_unit {
            ExecutionUnitId::Cpu => self.cpu.step(&mut self.memory),
            ExecutionUnitId::Gpu => self.memory.vdp_mut().run_gpu(1, true),
        }
    }

    /// Arm a break after the next instruction on the active unit and
    /// mark the machine running so the shell's pump resumes.
    pub fn step_over(&mut self) {
        match self.active_unit {
            ExecutionUnitId::Cpu => self.cpu.break_after_next(),
            ExecutionUnitId::Gpu => {
                if let Some(gpu) = self.memory.vdp_mut().gpu_mut() {
                    gpu.break_after_next();
                }
            }
        }
        self.running = true;
    }

    pub fn set_breakpoint(&mut self, addr: Option<u16>) {
        self.cpu.set_breakpoint(addr);
    }

    pub fn set_gpu_breakpoint(&mut self, addr: Option<u16>) {
        if let Some(gpu) = self.memory.vdp_mut().gpu_mut() {
            gpu.set_breakpoint(addr);
        }
    }

    /// Subscribe to per-scanline nominal cycle counts. Emission never
    /// blocks; a full buffer drops counts.
    pub fn cycle_feed(&mut self) -> Receiver<u32> {
        let (sender, receiver) = sync_channel(CYCLE_FEED_DEPTH);
        self.cycle_feed = Some(sender);
        receiver
    }

    #[must_use]
    pub fn cpu(&self) -> &Tms9900 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Tms9900 {
        &mut self.cpu
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn input_mut(&mut self) -> &mut InputQueue {
        &mut self.input
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The scanline the scheduler will execute next.
    #[must_use]
    pub fn scanline(&self) -> u32 {
        self.next_scanline
    }

    #[must_use]
    pub fn active_unit(&self) -> ExecutionUnitId {
        self.active_unit
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.memory.vdp().framebuffer()
    }

    /// Drain the sound chip's sample buffer.
    pub fn take_audio_samples(&mut self) -> Vec<f32> {
        self.memory.psg_mut().take_buffer()
    }

    pub fn set_key(&mut self, column: u8, row: u8, pressed: bool) {
        self.memory
            .cru_mut()
            .keyboard_mut()
            .set_key(column, row, pressed);
    }
}

fn parse_address(text: &str) -> Option<u16> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix('$')) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

const TI99_QUERY_PATHS: &[&str] = &[
    "cpu.pc",
    "cpu.wp",
    "cpu.st",
    "cpu.cycles",
    "memory.<address>",
    "cartridge.bank",
    "grom.address",
    "speech.talking",
    "bridge.errors",
    "frame",
    "scanline",
    "active",
];

impl Observable for Ti99 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            return self.cpu.query(rest);
        }
        if let Some(rest) = path.strip_prefix("memory.") {
            let addr = parse_address(rest)?;
            return Some(self.memory.peek_word(addr).into());
        }
        match path {
            "cartridge.bank" => Some(Value::U32(self.memory.cartridge_bank() as u32)),
            "grom.address" => Some(self.memory.grom_address().into()),
            "speech.talking" => self
                .memory
                .speech()
                .map(|speech| speech.is_talking().into()),
            "bridge.errors" => self
                .memory
                .bridge()
                .map(|bridge| bridge.protocol_errors().into()),
            "frame" => Some(self.frame_count.into()),
            "scanline" => Some(Value::U32(self.next_scanline)),
            "active" => Some(Value::String(format!("{:?}", self.active_unit))),
            _ => self.cpu.query(path),
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        TI99_QUERY_PATHS
    }
}

impl Stateful for Ti99 {
    fn get_state(&self) -> Json {
        json!({
            "cpu": self.cpu.get_state(),
            "memory": self.memory.get_state(),
            "cru": self.memory.cru().get_state(),
            "keyboard": self.memory.cru().keyboard().get_state(),
            "video": self.memory.vdp().get_state(),
            "sound": self.memory.psg().get_state(),
            "speech": self.memory.speech().map_or(Json::Null, Stateful::get_state),
            "tape": self.memory.cru().tape().get_state(),
            "card": self.memory.fdc().map_or(Json::Null, Stateful::get_state),
        })
    }

    // Absent or null keys leave that subsystem untouched; partial
    // restore is supported by design.
    fn restore_state(&mut self, state: &Json) {
        if let Some(cpu) = state.get("cpu").filter(|v| !v.is_null()) {
            self.cpu.restore_state(cpu);
        }
        if let Some(memory) = state.get("memory").filter(|v| !v.is_null()) {
            self.memory.restore_state(memory);
        }
        if let Some(cru) = state.get("cru").filter(|v| !v.is_null()) {
            self.memory.cru_mut().restore_state(cru);
        }
        if let Some(keyboard) = state.get("keyboard").filter(|v| !v.is_null()) {
            self.memory.cru_mut().keyboard_mut().restore_state(keyboard);
        }
        if let Some(video) = state.get("video").filter(|v| !v.is_null()) {
            self.memory.vdp_mut().restore_state(video);
        }
        if let Some(sound) = state.get("sound").filter(|v| !v.is_null()) {
            self.memory.psg_mut().restore_state(sound);
        }
        if let Some(speech) = state.get("speech").filter(|v| !v.is_null()) {
            if let Some(chip) = self.memory.speech_mut() {
                chip.restore_state(speech);
            }
        }
        if let Some(tape) = state.get("tape").filter(|v| !v.is_null()) {
            self.memory.cru_mut().tape_mut().restore_state(tape);
        }
        if let Some(card) = state.get("card").filter(|v| !v.is_null()) {
            if let Some(fdc) = self.memory.fdc_mut() {
                fdc.restore_state(card);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ti_tms9918::VdpVariant;

    // Vectors at 0x0000 point the CPU at 0x0010 with its workspace in
    // the scratchpad.
    fn rom_with_program(program: &[u16]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x2000];
        rom[0] = 0x83;
        rom[1] = 0x00;
        rom[2] = 0x00;
        rom[3] = 0x10;
        for (i, word) in program.iter().enumerate() {
            let offset = 0x10 + i * 2;
            rom[offset] = (word >> 8) as u8;
            rom[offset + 1] = *word as u8;
        }
        rom
    }

    fn make_machine(program: &[u16]) -> Ti99 {
        let config = Ti99Config {
            rom: rom_with_program(program),
            ..Ti99Config::default()
        };
        Ti99::new(&config)
    }

    #[test]
    fn one_frame_consumes_the_nominal_budget() {
        // JMP $ spins the CPU for the whole frame.
        let mut machine = make_machine(&[0x10FF]);
        let feed = machine.cycle_feed();
        let result = machine.run_frame(false);

        assert_eq!(result.halted_at, None);
        assert_eq!(
            result.cycles,
            u64::from(SCANLINES_PER_FRAME) * u64::from(CYCLES_PER_SCANLINE)
        );
        assert_eq!(machine.frame_count(), 1);
        assert_eq!(machine.scanline(), 0);

        let counts: Vec<u32> = feed.try_iter().collect();
        assert_eq!(counts.len(), SCANLINES_PER_FRAME as usize);
        assert!(counts.iter().all(|&c| c == CYCLES_PER_SCANLINE));
    }

    #[test]
    fn fast_mode_scales_the_budget() {
        let config = Ti99Config {
            rom: rom_with_program(&[0x10FF]),
            fast: true,
            ..Ti99Config::default()
        };
        let mut machine = Ti99::new(&config);
        let result = machine.run_frame(false);
        assert_eq!(
            result.cycles,
            u64::from(SCANLINES_PER_FRAME) * u64::from(CYCLES_PER_SCANLINE) * 3
        );
    }

    #[test]
    fn breakpoint_halts_mid_frame_and_resumes_from_the_same_line() {
        // Count down for a few thousand cycles, then fall through the
        // breakpoint address once and spin past it.
        let mut machine = make_machine(&[
            0x0201, 0x03E8, // LI R1, 1000
            0x0601, // DEC R1
            0x16FE, // JNE -2
            0x04C2, // CLR R2
            0x10FF, // JMP $
        ]);
        let feed = machine.cycle_feed();
        machine.set_breakpoint(Some(0x0018));

        let first = machine.run_frame(false);
        assert_eq!(first.halted_at, Some(emu_core::ExecutionUnitId::Cpu));
        assert_eq!(machine.frame_count(), 0, "frame is not complete");
        let halted_line = machine.scanline();
        assert!(halted_line > 0 && halted_line < SCANLINES_PER_FRAME);
        let first_counts: Vec<u32> = feed.try_iter().collect();
        assert_eq!(first_counts.len(), halted_line as usize);

        let second = machine.run_frame(true);
        assert_eq!(second.halted_at, None);
        assert_eq!(machine.frame_count(), 1);
        assert_eq!(machine.scanline(), 0);
        assert_eq!(
            first.cycles + second.cycles,
            u64::from(SCANLINES_PER_FRAME) * u64::from(CYCLES_PER_SCANLINE)
        );
        let second_counts: Vec<u32> = feed.try_iter().collect();
        assert_eq!(
            first_counts.len() + second_counts.len(),
            SCANLINES_PER_FRAME as usize
        );
    }

    #[test]
    fn idle_cpu_still_finishes_the_frame() {
        let mut machine = make_machine(&[0x0340]); // IDLE
        let result = machine.run_frame(false);
        assert_eq!(result.halted_at, None);
        assert_eq!(machine.frame_count(), 1);
        assert!(machine.cpu().is_idle());
    }

    #[test]
    fn speech_suspension_recovers_within_the_frame() {
        // Speak-external, then overfill the FIFO with MOVB writes.
        let mut program = vec![
            0x0201, 0x6000, // LI R1, 0x6000
            0xD801, 0x9400, // MOVB R1, @0x9400 (speak external)
            0x0201, 0x0000, // LI R1, 0
        ];
        for _ in 0..17 {
            program.extend_from_slice(&[0xD801, 0x9400]);
        }
        program.push(0x10FF); // JMP $
        let mut machine = make_machine(&program);

        let result = machine.run_frame(false);
        assert_eq!(result.halted_at, None);
        assert_eq!(
            result.cycles,
            u64::from(SCANLINES_PER_FRAME) * u64::from(CYCLES_PER_SCANLINE)
        );
        assert!(
            !machine.cpu().is_suspended(),
            "drain lifted the suspension before the frame ended"
        );
        assert!(machine.memory().speech().unwrap().is_talking());
    }

    #[test]
    fn gpu_breakpoint_halts_the_frame() {
        let config = Ti99Config {
            rom: rom_with_program(&[0x10FF]),
            vdp: VdpVariant::F18a,
            ..Ti99Config::default()
        };
        let mut machine = Ti99::new(&config);
        let gpu = machine.memory_mut().vdp_mut().gpu_mut().unwrap();
        gpu.set_idle(false);
        let pc = gpu.pc();
        gpu.set_breakpoint(Some(pc));

        let first = machine.run_frame(false);
        assert_eq!(first.halted_at, Some(emu_core::ExecutionUnitId::Gpu));
        assert_eq!(machine.active_unit(), emu_core::ExecutionUnitId::Gpu);
        assert_eq!(machine.frame_count(), 0);

        machine.set_gpu_breakpoint(None);
        let second = machine.run_frame(true);
        assert_eq!(second.halted_at, None);
        assert_eq!(machine.frame_count(), 1);
        assert_eq!(
            first.cycles + second.cycles,
            u64::from(SCANLINES_PER_FRAME) * u64::from(CYCLES_PER_SCANLINE)
        );
    }

    #[test]
    fn step_executes_one_instruction() {
        let mut machine = make_machine(&[
            0x0201, 0x1234, // LI R1, 0x1234
            0x10FF, // JMP $
        ]);
        assert_eq!(machine.cpu().pc(), 0x0010);
        machine.step();
        assert_eq!(machine.cpu().pc(), 0x0014);
    }

    #[test]
    fn step_over_halts_after_the_next_instruction() {
        let mut machine = make_machine(&[
            0x0201, 0x1234, // LI R1, 0x1234
            0x0202, 0x5678, // LI R2, 0x5678
            0x10FF, // JMP $
        ]);
        machine.step_over();
        let result = machine.run_frame(true);
        assert_eq!(result.halted_at, Some(emu_core::ExecutionUnitId::Cpu));
        assert_eq!(machine.cpu().pc(), 0x0014);
    }

    #[test]
    fn reset_returns_to_the_vectors() {
        let mut machine = make_machine(&[0x10FF]);
        machine.run_frame(false);
        machine.run_frame(false);
        assert_eq!(machine.frame_count(), 2);
        machine.reset();
        assert_eq!(machine.frame_count(), 0);
        assert_eq!(machine.scanline(), 0);
        assert_eq!(machine.cpu().pc(), 0x0010);
        assert_eq!(machine.cpu().wp(), 0x8300);
    }

    #[test]
    fn queued_input_lands_in_the_key_matrix() {
        let mut machine = make_machine(&[0x10FF]);
        machine.input_mut().enqueue_key(2, 4, 0, 1);
        machine.run_frame(false);
        assert!(machine.memory().cru().keyboard().is_pressed(2, 4));
        machine.run_frame(false);
        assert!(!machine.memory().cru().keyboard().is_pressed(2, 4));
    }

    #[test]
    fn snapshot_round_trips_the_aggregate() {
        let mut machine = make_machine(&[0x10FF]);
        machine.run_frame(false);
        machine.memory_mut().write_word(0x8320, 0xDEAD);
        machine.set_key(1, 1, true);

        let state = machine.get_state();
        let mut restored = make_machine(&[0x10FF]);
        restored.restore_state(&state);

        assert_eq!(restored.memory().peek_word(0x8320), 0xDEAD);
        assert!(restored.memory().cru().keyboard().is_pressed(1, 1));
        assert_eq!(restored.cpu().get_state(), machine.cpu().get_state());
    }

    #[test]
    fn partial_snapshots_leave_other_subsystems_alone() {
        let mut machine = make_machine(&[0x10FF]);
        machine.memory_mut().write_word(0x8320, 0xBEEF);
        machine.restore_state(&json!({ "keyboard": { "alphaLock": false } }));
        assert_eq!(machine.memory().peek_word(0x8320), 0xBEEF);
        assert!(!machine.memory().cru().keyboard().alpha_lock());
    }

    #[test]
    fn queries_resolve_component_paths() {
        let mut machine = make_machine(&[0x10FF]);
        machine.memory_mut().write_word(0x8300, 0xABCD);
        assert_eq!(machine.query("cpu.pc"), Some(Value::U16(0x0010)));
        assert_eq!(machine.query("pc"), Some(Value::U16(0x0010)));
        assert_eq!(machine.query("memory.0x8300"), Some(Value::U16(0xABCD)));
        assert_eq!(machine.query("memory.$8300"), Some(Value::U16(0xABCD)));
        assert_eq!(machine.query("frame"), Some(Value::U64(0)));
        assert_eq!(machine.query("speech.talking"), Some(Value::Bool(false)));
        assert_eq!(machine.query("nonsense"), None);
    }
}
