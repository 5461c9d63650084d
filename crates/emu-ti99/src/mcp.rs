//! MCP (Model Context Protocol) server for the TI-99/4A emulator.
//!
//! Exposes the emulator as a JSON-RPC 2.0 server over stdin/stdout.
//! Tools allow AI agents and scripts to boot, control, observe, and
//! capture the emulator programmatically.

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use emu_core::{Bus, ExecutionUnit, ExecutionUnitId, Observable, Stateful};
use ti_tms9918::{FB_HEIGHT, FB_WIDTH, VdpVariant};

use crate::capture;
use crate::config::{DiskControllerKind, Ti99Config};
use crate::console::{AUDIO_SAMPLE_RATE, Ti99};
use crate::disk::DiskImage;

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: JsonValue,
    id: JsonValue,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: JsonValue,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: JsonValue, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError { code, message }),
            id,
        }
    }
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

/// MCP server wrapping a headless TI-99/4A instance.
pub struct McpServer {
    machine: Option<Ti99>,
    rom_path: Option<PathBuf>,
}

impl McpServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            machine: None,
            rom_path: None,
        }
    }

    /// Set a default console ROM path (from CLI --rom argument).
    pub fn set_rom_path(&mut self, path: PathBuf) {
        self.rom_path = Some(path);
    }

    /// Run the server loop.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut stdout = stdout.lock();

        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };

            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let request: RpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    let resp = RpcResponse::error(
                        JsonValue::Null,
                        -32700,
                        format!("Parse error: {e}"),
                    );
                    let _ = writeln!(
                        stdout,
                        "{}",
                        serde_json::to_string(&resp).unwrap_or_default()
                    );
                    let _ = stdout.flush();
                    continue;
                }
            };

            if request.jsonrpc != "2.0" {
                let resp = RpcResponse::error(
                    request.id,
                    -32600,
                    "Invalid JSON-RPC version".to_string(),
                );
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::to_string(&resp).unwrap_or_default()
                );
                let _ = stdout.flush();
                continue;
            }

            let response = self.dispatch(&request.method, &request.params, request.id.clone());
            let _ = writeln!(
                stdout,
                "{}",
                serde_json::to_string(&response).unwrap_or_default()
            );
            let _ = stdout.flush();
        }
    }

    fn dispatch(&mut self, method: &str, params: &JsonValue, id: JsonValue) -> RpcResponse {
        match method {
            "boot" => self.handle_boot(params, id),
            "reset" => self.handle_reset(id),
            "run_frames" => self.handle_run_frames(params, id),
            "step_instruction" => self.handle_step_instruction(id),
            "step_over" => self.handle_step_over(id),
            "set_breakpoint" => self.handle_set_breakpoint(params, id),
            "press_key" => self.handle_key(params, id, true),
            "release_key" => self.handle_key(params, id, false),
            "queue_key" => self.handle_queue_key(params, id),
            "mouse" => self.handle_mouse(params, id),
            "insert_disk" => self.handle_insert_disk(params, id),
            "screenshot" => self.handle_screenshot(id),
            "audio_capture" => self.handle_audio_capture(params, id),
            "query" => self.handle_query(params, id),
            "poke" => self.handle_poke(params, id),
            "state_save" => self.handle_state_save(id),
            "state_load" => self.handle_state_load(params, id),
            _ => RpcResponse::error(id, -32601, format!("Unknown method: {method}")),
        }
    }

    fn require_machine(&mut self, id: &JsonValue) -> Result<&mut Ti99, RpcResponse> {
        if self.machine.is_some() {
            Ok(self.machine.as_mut().expect("checked is_some"))
        } else {
            Err(RpcResponse::error(
                id.clone(),
                -32000,
                "No machine instance. Call 'boot' first.".to_string(),
            ))
        }
    }

    fn handle_boot(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let rom = if let Some(b64) = params.get("rom").and_then(|v| v.as_str()) {
            match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(d) => d,
                Err(e) => return RpcResponse::error(id, -32602, format!("Invalid base64: {e}")),
            }
        } else if let Some(path) = params
            .get("path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| self.rom_path.clone())
        {
            match std::fs::read(&path) {
                Ok(d) => d,
                Err(e) => {
                    return RpcResponse::error(id, -32000, format!("Cannot read ROM: {e}"));
                }
            }
        } else {
            return RpcResponse::error(
                id,
                -32602,
                "Provide 'rom' (base64), 'path', or --rom CLI argument".to_string(),
            );
        };

        let grom = match decode_optional(params, "grom") {
            Ok(d) => d.unwrap_or_default(),
            Err(e) => return RpcResponse::error(id, -32602, e),
        };
        let cartridge_rom = match decode_optional(params, "cartridge") {
            Ok(d) => d,
            Err(e) => return RpcResponse::error(id, -32602, e),
        };
        let cartridge_grom = match decode_optional(params, "cartridge_grom") {
            Ok(d) => d,
            Err(e) => return RpcResponse::error(id, -32602, e),
        };
        let vdp = match params.get("vdp").and_then(|v| v.as_str()) {
            None => VdpVariant::Tms9918a,
            Some(name) => match parse_vdp_variant(name) {
                Some(v) => v,
                None => {
                    return RpcResponse::error(id, -32602, format!("Unknown VDP variant: {name}"));
                }
            },
        };

        let config = Ti99Config {
            rom,
            grom,
            cartridge_rom,
            cartridge_grom,
            vdp,
            fast: params.get("fast").and_then(JsonValue::as_bool).unwrap_or(false),
            disk: if params.get("disk").and_then(JsonValue::as_bool).unwrap_or(false) {
                DiskControllerKind::TiFdc
            } else {
                DiskControllerKind::None
            },
            bridge: params.get("bridge").and_then(JsonValue::as_bool).unwrap_or(false),
            ..Ti99Config::default()
        };

        let mut machine = Ti99::new(&config);
        machine.start();
        self.machine = Some(machine);
        RpcResponse::success(id, serde_json::json!({"status": "ok"}))
    }

    fn handle_reset(&mut self, id: JsonValue) -> RpcResponse {
        match self.require_machine(&id) {
            Ok(machine) => {
                machine.reset();
                RpcResponse::success(id, serde_json::json!({"status": "ok"}))
            }
            Err(e) => e,
        }
    }

    fn handle_run_frames(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let count = params.get("count").and_then(JsonValue::as_u64).unwrap_or(1);

        // A machine halted at a breakpoint resumes off its own address.
        let mut skip = is_halted(machine);
        let mut frames = 0u64;
        let mut cycles = 0u64;
        let mut halted: Option<ExecutionUnitId> = None;

        for _ in 0..count {
            let result = machine.run_frame(skip);
            skip = false;
            cycles += result.cycles;
            if let Some(unit) = result.halted_at {
                halted = Some(unit);
                break;
            }
            frames += 1;
        }

        RpcResponse::success(
            id,
            serde_json::json!({
                "frames": frames,
                "cycles": cycles,
                "frame_count": machine.frame_count(),
                "halted": halted.map(unit_name),
                "pc": format!("${:04X}", machine.cpu().pc()),
            }),
        )
    }

    fn handle_step_instruction(&mut self, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        machine.step();
        RpcResponse::success(
            id,
            serde_json::json!({
                "pc": format!("${:04X}", machine.cpu().pc()),
                "unit": unit_name(machine.active_unit()),
            }),
        )
    }

    fn handle_step_over(&mut self, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        machine.step_over();
        let result = machine.run_frame(true);
        RpcResponse::success(
            id,
            serde_json::json!({
                "pc": format!("${:04X}", machine.cpu().pc()),
                "halted": result.halted_at.map(unit_name),
            }),
        )
    }

    fn handle_set_breakpoint(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let gpu = params.get("gpu").and_then(JsonValue::as_bool).unwrap_or(false);
        let addr = match params.get("address") {
            None | Some(JsonValue::Null) => None,
            Some(v) => match v.as_u64() {
                Some(a) if a <= 0xFFFF => Some(a as u16),
                _ => {
                    return RpcResponse::error(
                        id,
                        -32602,
                        "Invalid 'address' (0-65535 or null to clear)".to_string(),
                    );
                }
            },
        };

        if gpu {
            machine.set_gpu_breakpoint(addr);
        } else {
            machine.set_breakpoint(addr);
        }
        RpcResponse::success(
            id,
            serde_json::json!({
                "address": addr,
                "unit": if gpu { "gpu" } else { "cpu" },
            }),
        )
    }

    fn handle_key(&mut self, params: &JsonValue, id: JsonValue, pressed: bool) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let Some((column, row)) = key_position(params) else {
            return RpcResponse::error(
                id,
                -32602,
                "Missing or invalid 'column'/'row' (0-7)".to_string(),
            );
        };

        machine.set_key(column, row, pressed);
        RpcResponse::success(
            id,
            serde_json::json!({"column": column, "row": row, "pressed": pressed}),
        )
    }

    fn handle_queue_key(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let Some((column, row)) = key_position(params) else {
            return RpcResponse::error(
                id,
                -32602,
                "Missing or invalid 'column'/'row' (0-7)".to_string(),
            );
        };
        let at_frame = params
            .get("frame")
            .and_then(JsonValue::as_u64)
            .unwrap_or_else(|| machine.frame_count());
        let hold = params.get("hold").and_then(JsonValue::as_u64).unwrap_or(1);

        machine.input_mut().enqueue_key(column, row, at_frame, hold);
        RpcResponse::success(
            id,
            serde_json::json!({
                "column": column,
                "row": row,
                "frame": at_frame,
                "hold": hold,
            }),
        )
    }

    fn handle_mouse(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let buttons = params
            .get("buttons")
            .and_then(JsonValue::as_u64)
            .unwrap_or(0) as u8;
        let dx = params.get("dx").and_then(JsonValue::as_i64).unwrap_or(0);
        let dy = params.get("dy").and_then(JsonValue::as_i64).unwrap_or(0);

        match machine.memory_mut().bridge_mut() {
            Some(bridge) => {
                bridge.set_mouse(buttons, dx as i16, dy as i16);
                RpcResponse::success(
                    id,
                    serde_json::json!({"buttons": buttons, "dx": dx, "dy": dy}),
                )
            }
            None => RpcResponse::error(
                id,
                -32000,
                "No serial-bridge card installed".to_string(),
            ),
        }
    }

    fn handle_insert_disk(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let drive = params.get("drive").and_then(JsonValue::as_u64).unwrap_or(0) as usize;
        let data = match params.get("data").and_then(|v| v.as_str()) {
            Some(b64) => match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(d) => d,
                Err(e) => return RpcResponse::error(id, -32602, format!("Invalid base64: {e}")),
            },
            None => {
                return RpcResponse::error(id, -32602, "Missing 'data' parameter".to_string());
            }
        };

        let tracks = params.get("tracks").and_then(JsonValue::as_u64).unwrap_or(40) as u8;
        let sectors = params.get("sectors").and_then(JsonValue::as_u64).unwrap_or(9) as u8;
        let sides = params.get("sides").and_then(JsonValue::as_u64).unwrap_or(1) as u8;

        let image = match DiskImage::new(data, tracks, sectors, sides) {
            Ok(image) => image,
            Err(e) => return RpcResponse::error(id, -32602, e),
        };

        let Some(fdc) = machine.memory_mut().fdc_mut() else {
            return RpcResponse::error(id, -32000, "No disk controller installed".to_string());
        };
        match fdc.drive_mut(drive) {
            Some(slot) => {
                slot.insert(image);
                RpcResponse::success(id, serde_json::json!({"drive": drive, "status": "ok"}))
            }
            None => RpcResponse::error(id, -32602, "Invalid 'drive' (0-2)".to_string()),
        }
    }

    fn handle_screenshot(&mut self, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let rgba = capture::argb_to_rgba(machine.framebuffer());
        let mut png_buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_buf, FB_WIDTH, FB_HEIGHT);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = match encoder.write_header() {
                Ok(w) => w,
                Err(e) => {
                    return RpcResponse::error(id, -32000, format!("PNG encode error: {e}"));
                }
            };
            if let Err(e) = writer.write_image_data(&rgba) {
                return RpcResponse::error(id, -32000, format!("PNG write error: {e}"));
            }
        }

        let b64 = base64::engine::general_purpose::STANDARD.encode(&png_buf);
        RpcResponse::success(
            id,
            serde_json::json!({
                "format": "png",
                "width": FB_WIDTH,
                "height": FB_HEIGHT,
                "data": b64,
            }),
        )
    }

    fn handle_audio_capture(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let frames = params.get("frames").and_then(JsonValue::as_u64).unwrap_or(50);

        let mut samples: Vec<f32> = Vec::new();
        for _ in 0..frames {
            machine.run_frame(false);
            samples.extend(machine.take_audio_samples());
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: AUDIO_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = match hound::WavWriter::new(&mut cursor, spec) {
                Ok(w) => w,
                Err(e) => {
                    return RpcResponse::error(id, -32000, format!("WAV encode error: {e}"));
                }
            };
            for &sample in &samples {
                let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                if let Err(e) = writer.write_sample(scaled) {
                    return RpcResponse::error(id, -32000, format!("WAV write error: {e}"));
                }
            }
            if let Err(e) = writer.finalize() {
                return RpcResponse::error(id, -32000, format!("WAV finalize error: {e}"));
            }
        }

        let b64 = base64::engine::general_purpose::STANDARD.encode(cursor.into_inner());
        RpcResponse::success(
            id,
            serde_json::json!({
                "format": "wav",
                "samples": samples.len(),
                "frames": frames,
                "data": b64,
            }),
        )
    }

    fn handle_query(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let Some(path) = params.get("path").and_then(|v| v.as_str()) else {
            return RpcResponse::error(id, -32602, "Missing 'path' parameter".to_string());
        };

        match machine.query(path) {
            Some(value) => {
                let json_val = observable_to_json(&value);
                RpcResponse::success(id, serde_json::json!({"path": path, "value": json_val}))
            }
            None => RpcResponse::error(id, -32000, format!("Unknown query path: {path}")),
        }
    }

    fn handle_poke(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let addr = match params.get("address").and_then(JsonValue::as_u64) {
            Some(a) if a <= 0xFFFF => a as u16,
            _ => {
                return RpcResponse::error(
                    id,
                    -32602,
                    "Missing or invalid 'address' (0-65535)".to_string(),
                );
            }
        };
        let value = match params.get("value").and_then(JsonValue::as_u64) {
            Some(v) if v <= 0xFFFF => v as u16,
            _ => {
                return RpcResponse::error(
                    id,
                    -32602,
                    "Missing or invalid 'value' (0-65535)".to_string(),
                );
            }
        };

        // Bus-visible word write: pokes to device windows hit the device.
        machine.memory_mut().write_word(addr, value);
        RpcResponse::success(id, serde_json::json!({"address": addr, "value": value}))
    }

    fn handle_state_save(&mut self, id: JsonValue) -> RpcResponse {
        match self.require_machine(&id) {
            Ok(machine) => {
                let state = machine.get_state();
                RpcResponse::success(id, serde_json::json!({"state": state}))
            }
            Err(e) => e,
        }
    }

    fn handle_state_load(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let machine = match self.require_machine(&id) {
            Ok(m) => m,
            Err(e) => return e,
        };

        let Some(state) = params.get("state") else {
            return RpcResponse::error(id, -32602, "Missing 'state' parameter".to_string());
        };

        machine.restore_state(state);
        RpcResponse::success(id, serde_json::json!({"status": "ok"}))
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_optional(params: &JsonValue, key: &str) -> Result<Option<Vec<u8>>, String> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(b64) => base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map(Some)
            .map_err(|e| format!("Invalid base64 in '{key}': {e}")),
        None => Ok(None),
    }
}

fn parse_vdp_variant(name: &str) -> Option<VdpVariant> {
    match name.to_ascii_lowercase().as_str() {
        "9918a" | "tms9918a" => Some(VdpVariant::Tms9918a),
        "f18a" => Some(VdpVariant::F18a),
        "v9938" => Some(VdpVariant::V9938),
        _ => None,
    }
}

fn key_position(params: &JsonValue) -> Option<(u8, u8)> {
    let column = params.get("column").and_then(JsonValue::as_u64)?;
    let row = params.get("row").and_then(JsonValue::as_u64)?;
    if column < 8 && row < 8 {
        Some((column as u8, row as u8))
    } else {
        None
    }
}

fn is_halted(machine: &mut Ti99) -> bool {
    match machine.active_unit() {
        ExecutionUnitId::Cpu => machine.cpu().is_stopped_at_breakpoint(),
        ExecutionUnitId::Gpu => machine
            .memory_mut()
            .vdp_mut()
            .gpu_mut()
            .is_some_and(|gpu| gpu.is_stopped_at_breakpoint()),
    }
}

fn unit_name(unit: ExecutionUnitId) -> &'static str {
    match unit {
        ExecutionUnitId::Cpu => "cpu",
        ExecutionUnitId::Gpu => "gpu",
    }
}

fn observable_to_json(value: &emu_core::Value) -> JsonValue {
    match value {
        emu_core::Value::U8(v) => serde_json::json!(v),
        emu_core::Value::U16(v) => serde_json::json!(v),
        emu_core::Value::U32(v) => serde_json::json!(v),
        emu_core::Value::U64(v) => serde_json::json!(v),
        emu_core::Value::I8(v) => serde_json::json!(v),
        emu_core::Value::Bool(v) => serde_json::json!(v),
        emu_core::Value::String(v) => serde_json::json!(v),
        emu_core::Value::Array(v) => serde_json::json!(format!("{v:?}")),
        emu_core::Value::Map(v) => serde_json::json!(format!("{v:?}")),
    }
}
