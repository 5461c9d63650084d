//! TI-99/4A emulator binary.
//!
//! Runs the console with a winit window and pixels framebuffer, or in
//! headless mode for screenshots and captures, or as an MCP server.

#![allow(clippy::cast_possible_truncation)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use emu_core::ExecutionUnit;
use emu_ti99::mcp::McpServer;
use emu_ti99::pacer::FramePacer;
use emu_ti99::{
    AUDIO_SAMPLE_RATE, DiskControllerKind, DiskImage, PacerKind, Ti99, Ti99Config, capture,
    keyboard_map,
};
use pixels::{Pixels, SurfaceTexture};
use ti_tms9918::VdpVariant;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

/// Framebuffer dimensions.
const FB_WIDTH: u32 = ti_tms9918::FB_WIDTH;
const FB_HEIGHT: u32 = ti_tms9918::FB_HEIGHT;

/// Window scale factor.
const SCALE: u32 = 3;

/// Output channels; the mono PSG is duplicated into both.
const AUDIO_CHANNELS: usize = 2;

/// Audio queue bound in seconds of buffered output.
const AUDIO_QUEUE_SECONDS: usize = 1;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    rom_path: Option<PathBuf>,
    grom_path: Option<PathBuf>,
    cart_path: Option<PathBuf>,
    disk_path: Option<PathBuf>,
    fdc_dsr_path: Option<PathBuf>,
    vdp: VdpVariant,
    bridge: bool,
    fast: bool,
    headless: bool,
    mcp: bool,
    frames: u32,
    screenshot_path: Option<PathBuf>,
    wav_path: Option<PathBuf>,
    record_dir: Option<PathBuf>,
    realtime: bool,
    pacer: Option<PacerKind>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        rom_path: None,
        grom_path: None,
        cart_path: None,
        disk_path: None,
        fdc_dsr_path: None,
        vdp: VdpVariant::Tms9918a,
        bridge: false,
        fast: false,
        headless: false,
        mcp: false,
        frames: 200,
        screenshot_path: None,
        wav_path: None,
        record_dir: None,
        realtime: false,
        pacer: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rom" => {
                i += 1;
                cli.rom_path = args.get(i).map(PathBuf::from);
            }
            "--grom" => {
                i += 1;
                cli.grom_path = args.get(i).map(PathBuf::from);
            }
            "--cart" => {
                i += 1;
                cli.cart_path = args.get(i).map(PathBuf::from);
            }
            "--disk" => {
                i += 1;
                cli.disk_path = args.get(i).map(PathBuf::from);
            }
            "--fdc-dsr" => {
                i += 1;
                cli.fdc_dsr_path = args.get(i).map(PathBuf::from);
            }
            "--vdp" => {
                i += 1;
                let name = args.get(i).map(String::as_str).unwrap_or("");
                cli.vdp = match parse_vdp(name) {
                    Some(v) => v,
                    None => {
                        eprintln!("Unknown VDP variant: {name} (expected 9918a, f18a, v9938)");
                        process::exit(1);
                    }
                };
            }
            "--bridge" => {
                cli.bridge = true;
            }
            "--fast" => {
                cli.fast = true;
            }
            "--headless" => {
                cli.headless = true;
            }
            "--mcp" => {
                cli.mcp = true;
            }
            "--frames" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.frames = s.parse().unwrap_or(200);
                }
            }
            "--screenshot" => {
                i += 1;
                cli.screenshot_path = args.get(i).map(PathBuf::from);
            }
            "--wav" => {
                i += 1;
                cli.wav_path = args.get(i).map(PathBuf::from);
            }
            "--record" => {
                i += 1;
                cli.record_dir = args.get(i).map(PathBuf::from);
            }
            "--realtime" => {
                cli.realtime = true;
            }
            "--pacer" => {
                i += 1;
                cli.pacer = match args.get(i).map(String::as_str) {
                    Some("fixed") => Some(PacerKind::FixedInterval),
                    Some("vsync") => Some(PacerKind::Vsync),
                    other => {
                        eprintln!("Unknown pacer: {} (expected fixed, vsync)", other.unwrap_or(""));
                        process::exit(1);
                    }
                };
            }
            "--help" | "-h" => {
                eprintln!("Usage: emu-ti99 [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --rom <file>         Console ROM file (8K)");
                eprintln!("  --grom <file>        Console GROM file");
                eprintln!("  --cart <file>        Cartridge ROM file (8K banks)");
                eprintln!("  --disk <file>        DSK1 sector image (enables the disk controller)");
                eprintln!("  --fdc-dsr <file>     Disk controller DSR ROM");
                eprintln!("  --vdp <variant>      Video processor: 9918a, f18a, v9938 [default: 9918a]");
                eprintln!("  --bridge             Install the serial-bridge card (loopback transport)");
                eprintln!("  --fast               Triple the CPU and GPU cycle budgets");
                eprintln!("  --headless           Run without a window");
                eprintln!("  --mcp                Run as MCP server (JSON-RPC over stdio)");
                eprintln!("  --frames <n>         Number of frames in headless mode [default: 200]");
                eprintln!("  --screenshot <file>  Save a PNG screenshot (headless)");
                eprintln!("  --wav <file>         Save PSG output as WAV (headless)");
                eprintln!("  --record <dir>       Record frames to directory (headless)");
                eprintln!("  --realtime           Pace headless frames at ~60 Hz");
                eprintln!("  --pacer <kind>       Run-loop pacer: fixed, vsync");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn parse_vdp(name: &str) -> Option<VdpVariant> {
    match name.to_ascii_lowercase().as_str() {
        "9918a" | "tms9918a" => Some(VdpVariant::Tms9918a),
        "f18a" => Some(VdpVariant::F18a),
        "v9938" => Some(VdpVariant::V9938),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Headless mode
// ---------------------------------------------------------------------------

fn run_headless(cli: &CliArgs) {
    let mut machine = make_machine(cli);
    machine.start();

    if let Some(ref dir) = cli.record_dir {
        if let Err(e) = capture::record(&mut machine, dir, cli.frames) {
            eprintln!("Record error: {e}");
            process::exit(1);
        }
        return;
    }

    let mut all_audio = cli.wav_path.as_ref().map(|_| Vec::new());
    let mut pacer = cli
        .realtime
        .then(|| cli.pacer.unwrap_or(PacerKind::FixedInterval).create(Instant::now()));
    let started = Instant::now();

    let mut frame = 0u32;
    while frame < cli.frames {
        if let Some(pacer) = pacer.as_mut() {
            let now = Instant::now();
            if pacer.frames_due(now) == 0 {
                if let Some(deadline) = pacer.next_deadline() {
                    std::thread::sleep(deadline.saturating_duration_since(now));
                }
                continue;
            }
        }
        machine.run_frame(false);
        if let Some(audio) = all_audio.as_mut() {
            audio.extend(machine.take_audio_samples());
        } else {
            let _ = machine.take_audio_samples();
        }
        if frame % 60 == 0 {
            eprintln!("Frame {frame}: PC=${:04X}", machine.cpu().pc());
        }
        frame += 1;
    }

    let elapsed = started.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        eprintln!(
            "Ran {} frames in {elapsed:.2}s ({:.0} fps)",
            cli.frames,
            f64::from(cli.frames) / elapsed
        );
    }

    if let Some(ref path) = cli.screenshot_path {
        if let Err(e) = capture::save_screenshot(&machine, path) {
            eprintln!("Screenshot error: {e}");
            process::exit(1);
        }
        eprintln!("Screenshot saved to {}", path.display());
    }

    if let (Some(audio), Some(path)) = (all_audio, cli.wav_path.as_ref()) {
        if let Err(e) = capture::save_audio(&audio, path) {
            eprintln!("WAV error: {e}");
            process::exit(1);
        }
        eprintln!("Audio saved to {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// Windowed mode (winit + pixels)
// ---------------------------------------------------------------------------

struct App {
    machine: Ti99,
    pacer: Box<dyn FramePacer>,
    audio: Option<AudioOutput>,
    window: Option<&'static Window>,
    pixels: Option<Pixels<'static>>,
}

impl App {
    fn new(machine: Ti99, pacer: Box<dyn FramePacer>, audio: Option<AudioOutput>) -> Self {
        Self {
            machine,
            pacer,
            audio,
            window: None,
            pixels: None,
        }
    }

    fn handle_key(&mut self, keycode: KeyCode, pressed: bool) {
        if keycode == KeyCode::CapsLock {
            if pressed {
                let keyboard = self.machine.memory_mut().cru_mut().keyboard_mut();
                let engaged = keyboard.alpha_lock();
                keyboard.set_alpha_lock(!engaged);
            }
            return;
        }

        if let Some((column, row)) = keyboard_map::map_keycode(keycode) {
            self.machine.set_key(column, row, pressed);
        }
    }

    fn update_pixels(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };

        let fb = self.machine.framebuffer();
        let frame = pixels.frame_mut();

        for (i, &argb) in fb.iter().enumerate() {
            let offset = i * 4;
            frame[offset] = ((argb >> 16) & 0xFF) as u8;
            frame[offset + 1] = ((argb >> 8) & 0xFF) as u8;
            frame[offset + 2] = (argb & 0xFF) as u8;
            frame[offset + 3] = 0xFF;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_size = winit::dpi::LogicalSize::new(FB_WIDTH * SCALE, FB_HEIGHT * SCALE);
        let attrs = WindowAttributes::default()
            .with_title("TI-99/4A")
            .with_inner_size(window_size)
            .with_resizable(false);

        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window: &'static Window = Box::leak(Box::new(window));
                let inner = window.inner_size();
                let surface = SurfaceTexture::new(inner.width, inner.height, window);
                match Pixels::new(FB_WIDTH, FB_HEIGHT, surface) {
                    Ok(pixels) => {
                        self.pixels = Some(pixels);
                    }
                    Err(e) => {
                        eprintln!("Failed to create pixels: {e}");
                        event_loop.exit();
                        return;
                    }
                }
                self.window = Some(window);
            }
            Err(e) => {
                eprintln!("Failed to create window: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    if keycode == KeyCode::Escape && event.state == ElementState::Pressed {
                        event_loop.exit();
                        return;
                    }
                    self.handle_key(keycode, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::RedrawRequested => {
                if self.pacer.frames_due(Instant::now()) > 0 {
                    self.machine.run_frame(false);
                    let samples = self.machine.take_audio_samples();
                    if let Some(audio) = &self.audio {
                        audio.push_samples(&samples);
                    }
                    self.update_pixels();
                }

                if let Some(pixels) = self.pixels.as_ref()
                    && let Err(e) = pixels.render()
                {
                    eprintln!("Render error: {e}");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window {
            window.request_redraw();
        }
    }
}

// ---------------------------------------------------------------------------
// Audio output (cpal)
// ---------------------------------------------------------------------------

struct AudioOutput {
    _stream: cpal::Stream,
    queue: Arc<Mutex<VecDeque<f32>>>,
    max_samples: usize,
}

impl AudioOutput {
    fn new() -> Result<Self, String> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| String::from("no default audio output device"))?;

        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| format!("failed to query output configs: {e}"))?;

        let desired = supported_configs
            .filter(|cfg| cfg.channels() == AUDIO_CHANNELS as u16)
            .find(|cfg| {
                let min = cfg.min_sample_rate().0;
                let max = cfg.max_sample_rate().0;
                min <= AUDIO_SAMPLE_RATE && AUDIO_SAMPLE_RATE <= max
            })
            .ok_or_else(|| {
                format!("no {AUDIO_CHANNELS}-channel output config supports {AUDIO_SAMPLE_RATE} Hz")
            })?;

        let sample_format = desired.sample_format();
        let config = desired
            .with_sample_rate(cpal::SampleRate(AUDIO_SAMPLE_RATE))
            .config();

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let max_samples = (AUDIO_SAMPLE_RATE as usize) * AUDIO_CHANNELS * AUDIO_QUEUE_SECONDS;
        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                let callback_queue = Arc::clone(&queue);
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [f32], _| write_audio_data_f32(data, &callback_queue),
                        |err| eprintln!("Audio stream error: {err}"),
                        None,
                    )
                    .map_err(|e| format!("failed to build f32 audio stream: {e}"))?
            }
            cpal::SampleFormat::I16 => {
                let callback_queue = Arc::clone(&queue);
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _| write_audio_data_i16(data, &callback_queue),
                        |err| eprintln!("Audio stream error: {err}"),
                        None,
                    )
                    .map_err(|e| format!("failed to build i16 audio stream: {e}"))?
            }
            cpal::SampleFormat::U16 => {
                let callback_queue = Arc::clone(&queue);
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [u16], _| write_audio_data_u16(data, &callback_queue),
                        |err| eprintln!("Audio stream error: {err}"),
                        None,
                    )
                    .map_err(|e| format!("failed to build u16 audio stream: {e}"))?
            }
            other => {
                return Err(format!("unsupported audio sample format: {other:?}"));
            }
        };

        stream
            .play()
            .map_err(|e| format!("failed to start audio stream: {e}"))?;

        Ok(Self {
            _stream: stream,
            queue,
            max_samples,
        })
    }

    fn push_samples(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(_) => return,
        };

        for &sample in samples {
            // Mono PSG into both channels.
            queue.push_back(sample);
            queue.push_back(sample);
        }

        // Bounded: drop the oldest samples rather than falling behind.
        while queue.len() > self.max_samples {
            let _ = queue.pop_front();
        }
    }
}

fn write_audio_data_f32(data: &mut [f32], queue: &Arc<Mutex<VecDeque<f32>>>) {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(_) => {
            data.fill(0.0);
            return;
        }
    };

    for sample in data {
        *sample = guard.pop_front().unwrap_or(0.0);
    }
}

fn write_audio_data_i16(data: &mut [i16], queue: &Arc<Mutex<VecDeque<f32>>>) {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(_) => {
            data.fill(0);
            return;
        }
    };

    for sample in data {
        let value = guard.pop_front().unwrap_or(0.0).clamp(-1.0, 1.0);
        *sample = (value * f32::from(i16::MAX)) as i16;
    }
}

fn write_audio_data_u16(data: &mut [u16], queue: &Arc<Mutex<VecDeque<f32>>>) {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(_) => {
            data.fill(u16::MAX / 2);
            return;
        }
    };

    for sample in data {
        let value = guard.pop_front().unwrap_or(0.0).clamp(-1.0, 1.0);
        let scaled = ((value * 0.5) + 0.5) * f32::from(u16::MAX);
        *sample = scaled as u16;
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path, what: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to read {what} {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn make_machine(cli: &CliArgs) -> Ti99 {
    let rom_path = cli.rom_path.as_ref().unwrap_or_else(|| {
        eprintln!("No console ROM specified. Use --rom <file>");
        process::exit(1);
    });

    let mut config = Ti99Config {
        rom: read_file(rom_path, "console ROM"),
        vdp: cli.vdp,
        bridge: cli.bridge,
        fast: cli.fast,
        pacer: cli.pacer.unwrap_or_default(),
        ..Ti99Config::default()
    };
    if let Some(ref path) = cli.grom_path {
        config.grom = read_file(path, "console GROM");
    }
    if let Some(ref path) = cli.cart_path {
        config.cartridge_rom = Some(read_file(path, "cartridge ROM"));
    }
    if cli.disk_path.is_some() || cli.fdc_dsr_path.is_some() {
        config.disk = DiskControllerKind::TiFdc;
        if let Some(ref path) = cli.fdc_dsr_path {
            config.fdc_dsr = Some(read_file(path, "FDC DSR ROM"));
        }
    }

    let mut machine = Ti99::new(&config);
    eprintln!("Loaded console ROM: {}", rom_path.display());

    if let Some(ref path) = cli.disk_path {
        let data = read_file(path, "disk image");
        match DiskImage::single_sided(data) {
            Ok(image) => {
                machine
                    .memory_mut()
                    .fdc_mut()
                    .expect("disk controller configured")
                    .drive_mut(0)
                    .expect("DSK1 exists")
                    .insert(image);
                eprintln!("Loaded DSK1: {}", path.display());
            }
            Err(e) => {
                eprintln!("Failed to load disk image {}: {e}", path.display());
                process::exit(1);
            }
        }
    }

    machine
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = parse_args();

    if cli.mcp {
        let mut server = McpServer::new();
        if let Some(ref path) = cli.rom_path {
            server.set_rom_path(path.clone());
        }
        server.run();
        return;
    }

    if cli.headless {
        run_headless(&cli);
        return;
    }

    let mut machine = make_machine(&cli);
    machine.start();

    let audio = match AudioOutput::new() {
        Ok(audio) => Some(audio),
        Err(e) => {
            eprintln!("Audio unavailable: {e}");
            None
        }
    };

    // The display drives the run loop in windowed mode.
    let kind = cli.pacer.unwrap_or(PacerKind::Vsync);
    let mut app = App::new(machine, kind.create(Instant::now()), audio);

    let event_loop = match EventLoop::new() {
        Ok(el) => el,
        Err(e) => {
            eprintln!("Failed to create event loop: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = event_loop.run_app(&mut app) {
        eprintln!("Event loop error: {e}");
        process::exit(1);
    }
}
