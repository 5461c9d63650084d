//! F18A FPGA replacement.
//!
//! Boots as a register-compatible TMS9918A. Two consecutive writes of
//! 0x1C to VR57 unlock the extended register file (6-bit register
//! numbers through the same 2-phase port), a 64-entry 12-bit palette
//! programmed through the data port, a per-line sprite-limit override,
//! selectable status registers, and a TMS9900 coprocessor that executes
//! straight out of VRAM under VR54-VR56 control.

use emu_core::{Bus, ExecutionUnit, Stateful, state_bytes, state_get_bytes};
use serde_json::json;
use ti_tms9900::Tms9900;

use crate::palette::{PALETTE_RGB12, argb_from_rgb12};
use crate::{FB_HEIGHT, FB_WIDTH, ScreenMode, VdpVariant, VideoProcessor};

const RAM_SIZE: usize = 0x4000;
const DRAW_HEIGHT: u32 = 192;
const TOP_BORDER: u32 = (FB_HEIGHT - DRAW_HEIGHT) / 2;
const SPRITE_TERMINATOR: u8 = 0xD0;
const STATUS_IDLE: u8 = 0x1F;

const REG_COUNT: usize = 64;
const PALETTE_SIZE: usize = 64;

// Extended registers with side effects.
const VR_STATUS_SELECT: usize = 15;
const VR_SPRITE_LIMIT: usize = 30;
const VR_PALETTE_CONTROL: usize = 47;
const VR_GPU_PC_MSB: usize = 54;
const VR_GPU_PC_LSB: usize = 55;
const VR_GPU_CONTROL: usize = 56;
const VR_LOCK: usize = 57;
/// The value VR57 must see twice in a row to unlock.
const UNLOCK_VALUE: u8 = 0x1C;

/// F18A enhanced VDP.
pub struct F18a {
    ram: Vec<u8>,
    registers: [u8; REG_COUNT],
    palette_ram: [u16; PALETTE_SIZE],
    address: u16,
    latch: bool,
    prefetch: u8,
    status: u8,
    flicker: bool,

    unlocked: bool,
    unlock_writes: u8,
    status_select: u8,
    /// VR30 override; 0 means the stock cap applies.
    sprite_limit: u8,
    palette_index: u8,
    /// High nibble of a half-written palette entry.
    palette_first_byte: Option<u8>,

    gpu: Tms9900,

    // Derived from the register file.
    display_on: bool,
    interrupts_on: bool,
    screen_mode: ScreenMode,
    bitmap_mode: bool,
    text_mode: bool,
    name_table: usize,
    color_table: usize,
    pattern_table: usize,
    sprite_attribute_table: usize,
    sprite_pattern_table: usize,
    color_table_mask: usize,
    pattern_table_mask: usize,
    ram_mask: u16,
    fg_color: u8,
    bg_color: u8,

    framebuffer: Vec<u32>,
}

/// What the coprocessor sees: VRAM as big-endian words at 0x0000, the
/// palette as one word per entry at 0x5000, the register file as byte
/// pairs at 0x6000. No CRU, no interrupt line.
struct GpuBus<'a> {
    ram: &'a mut [u8],
    palette: &'a mut [u16; PALETTE_SIZE],
    registers: &'a mut [u8; REG_COUNT],
}

impl Bus for GpuBus<'_> {
    fn read_word(&mut self, addr: u16) -> u16 {
        let addr = usize::from(addr & 0xFFFE);
        match addr {
            0x0000..=0x3FFF => (u16::from(self.ram[addr]) << 8) | u16::from(self.ram[addr + 1]),
            0x5000..=0x507F => self.palette[(addr - 0x5000) >> 1],
            0x6000..=0x603F => {
                let r = addr - 0x6000;
                (u16::from(self.registers[r]) << 8) | u16::from(self.registers[r + 1])
            }
            _ => 0,
        }
    }

    fn write_word(&mut self, addr: u16, value: u16) {
        let addr = usize::from(addr & 0xFFFE);
        match addr {
            0x0000..=0x3FFF => {
                self.ram[addr] = (value >> 8) as u8;
                self.ram[addr + 1] = value as u8;
            }
            0x5000..=0x507F => self.palette[(addr - 0x5000) >> 1] = value & 0x0FFF,
            0x6000..=0x603F => {
                let r = addr - 0x6000;
                self.registers[r] = (value >> 8) as u8;
                self.registers[r + 1] = value as u8;
            }
            _ => {}
        }
    }

    fn read_cru_bit(&mut self, _bit: u16) -> bool {
        false
    }

    fn write_cru_bit(&mut self, _bit: u16, _value: bool) {}
}

impl F18a {
    #[must_use]
    pub fn new(flicker: bool) -> Self {
        let mut vdp = Self {
            ram: vec![0; RAM_SIZE],
            registers: [0; REG_COUNT],
            palette_ram: [0; PALETTE_SIZE],
            address: 0,
            latch: false,
            prefetch: 0,
            status: 0,
            flicker,
            unlocked: false,
            unlock_writes: 0,
            status_select: 0,
            sprite_limit: 0,
            palette_index: 0,
            palette_first_byte: None,
            gpu: Tms9900::new(),
            display_on: false,
            interrupts_on: false,
            screen_mode: ScreenMode::Graphics,
            bitmap_mode: false,
            text_mode: false,
            name_table: 0,
            color_table: 0,
            pattern_table: 0,
            sprite_attribute_table: 0,
            sprite_pattern_table: 0,
            color_table_mask: RAM_SIZE - 1,
            pattern_table_mask: RAM_SIZE - 1,
            ram_mask: 0x3FFF,
            fg_color: 0,
            bg_color: 0,
            framebuffer: vec![0xFF00_0000; (FB_WIDTH * FB_HEIGHT) as usize],
        };
        vdp.reset();
        vdp
    }

    /// Current screen mode.
    #[must_use]
    pub fn screen_mode(&self) -> ScreenMode {
        self.screen_mode
    }

    /// VRAM byte at `addr` (no side effects, for debuggers).
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.ram[usize::from(addr) & (RAM_SIZE - 1)]
    }

    /// True once the extended register file is reachable.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn vram(&self, addr: usize) -> u8 {
        self.ram[addr & (RAM_SIZE - 1)]
    }

    fn write_register(&mut self, reg: usize, value: u8) {
        if !self.unlocked {
            if reg == VR_LOCK {
                if value == UNLOCK_VALUE {
                    self.unlock_writes += 1;
                    if self.unlock_writes == 2 {
                        self.unlocked = true;
                        self.unlock_writes = 0;
                    }
                } else {
                    self.unlock_writes = 0;
                }
                return;
            }
            // Any other register write breaks the unlock sequence
            self.unlock_writes = 0;
            self.registers[reg & 0x07] = value;
            self.sync_derived_state();
            return;
        }
        if reg == VR_LOCK {
            // Any VR57 write while unlocked locks again
            self.unlocked = false;
            self.unlock_writes = 0;
            return;
        }
        self.registers[reg] = value;
        match reg {
            VR_PALETTE_CONTROL => {
                self.palette_index = value & 0x3F;
                self.palette_first_byte = None;
            }
            VR_GPU_PC_LSB => {
                let pc = (u16::from(self.registers[VR_GPU_PC_MSB]) << 8) | u16::from(value);
                self.gpu.set_pc(pc);
                self.gpu.set_idle(false);
            }
            VR_GPU_CONTROL => self.gpu.set_idle(value & 0x01 == 0),
            _ => {}
        }
        self.sync_derived_state();
    }

    /// Recompute everything the register file implies. Called after every
    /// register write and after each coprocessor run (the coprocessor can
    /// poke the register file through its memory map).
    fn sync_derived_state(&mut self) {
        let r1 = self.registers[1];
        self.ram_mask = if r1 & 0x80 != 0 { 0x3FFF } else { 0x1FFF };
        self.display_on = r1 & 0x40 != 0;
        self.interrupts_on = r1 & 0x20 != 0;
        self.status_select = self.registers[VR_STATUS_SELECT] & 0x0F;
        self.sprite_limit = self.registers[VR_SPRITE_LIMIT] & 0x3F;
        self.fg_color = self.registers[7] >> 4;
        self.bg_color = self.registers[7] & 0x0F;

        self.bitmap_mode = self.registers[0] & 0x02 != 0;
        self.text_mode = r1 & 0x10 != 0;
        self.screen_mode = match ((r1 & 0x18) >> 3, self.bitmap_mode) {
            (0, false) => ScreenMode::Graphics,
            (1, false) => ScreenMode::Multicolor,
            (2, false) => ScreenMode::Text,
            (0, true) => ScreenMode::Bitmap,
            (1, true) => ScreenMode::BitmapMulticolor,
            (2, true) => ScreenMode::BitmapText,
            _ => ScreenMode::Illegal,
        };
        if self.bitmap_mode {
            self.color_table = usize::from(self.registers[3] & 0x80) << 6;
            self.pattern_table = usize::from(self.registers[4] & 0x04) << 11;
        } else {
            self.color_table = usize::from(self.registers[3]) << 6;
            self.pattern_table = usize::from(self.registers[4] & 0x07) << 11;
        }
        self.name_table = usize::from(self.registers[2] & 0x0F) << 10;
        self.sprite_attribute_table = usize::from(self.registers[5] & 0x7F) << 7;
        self.sprite_pattern_table = usize::from(self.registers[6] & 0x07) << 11;
        match self.screen_mode {
            ScreenMode::Bitmap => {
                self.color_table_mask = (usize::from(self.registers[3] & 0x7F) << 6) | 0x3F;
                self.pattern_table_mask =
                    (usize::from(self.registers[4] & 0x03) << 11) | (self.color_table_mask & 0x7FF);
            }
            ScreenMode::BitmapText | ScreenMode::BitmapMulticolor => {
                self.color_table_mask = usize::from(self.ram_mask);
                self.pattern_table_mask = (usize::from(self.registers[4] & 0x03) << 11) | 0x7FF;
            }
            _ => {
                self.color_table_mask = usize::from(self.ram_mask);
                self.pattern_table_mask = usize::from(self.ram_mask);
            }
        }
    }

    /// Data-port write while VR47 bit 7 diverts the port to palette RAM.
    /// Entries arrive as two bytes, 0x0R then 0xGB.
    fn write_palette_data(&mut self, value: u8) {
        if let Some(high) = self.palette_first_byte.take() {
            let entry = (u16::from(high & 0x0F) << 8) | u16::from(value);
            self.palette_ram[usize::from(self.palette_index) & (PALETTE_SIZE - 1)] = entry;
            if self.registers[VR_PALETTE_CONTROL] & 0x40 != 0 {
                self.palette_index = (self.palette_index + 1) & 0x3F;
            }
        } else {
            self.palette_first_byte = Some(value);
        }
    }

    fn color_to_argb(&self, color: u8) -> u32 {
        argb_from_rgb12(self.palette_ram[usize::from(color & 0x0F)])
    }

    fn sprites_per_line(&self) -> u32 {
        if self.sprite_limit != 0 {
            u32::from(self.sprite_limit)
        } else if self.flicker {
            4
        } else {
            32
        }
    }

    fn scan_sprites(&self, y1: usize, buffer: &mut [u8]) -> (bool, bool, u8) {
        let r1 = self.registers[1];
        let size16 = r1 & 0x02 != 0;
        let magnify = u32::from(r1 & 0x01);
        let dimension = (if size16 { 16i32 } else { 8 }) << magnify;
        let cap = self.sprites_per_line();
        let y1 = y1 as i32;

        let mut on_line = 0u32;
        let mut collision = false;

        for s in 0..32usize {
            let attr = self.sprite_attribute_table + (s << 2);
            let sy0 = self.vram(attr);
            if sy0 == SPRITE_TERMINATOR {
                break;
            }
            let mut sy = i32::from(sy0);
            if sy > i32::from(SPRITE_TERMINATOR) {
                sy -= 256;
            }
            sy += 1;
            let sy_end = sy + dimension;

            let y2 = if s < 8 || !self.bitmap_mode {
                (y1 >= sy && y1 < sy_end).then_some(y1)
            } else {
                let masked = y1 & ((i32::from(self.registers[4] & 0x03) << 6) | 0x3F);
                if masked >= sy && masked < sy_end {
                    Some(masked)
                } else if (64..128).contains(&y1) && y1 >= sy && y1 < sy_end {
                    Some(y1)
                } else {
                    None
                }
            };
            let Some(y2) = y2 else { continue };

            if on_line >= cap {
                return (collision, true, s as u8);
            }
            on_line += 1;

            let mut sx = i32::from(self.vram(attr + 1));
            let pattern_no = usize::from(self.vram(attr + 2) & if size16 { 0xFC } else { 0xFF });
            let sprite_color = self.vram(attr + 3) & 0x0F;
            if self.vram(attr + 3) & 0x80 != 0 {
                sx -= 32;
            }
            let line = ((y2 - sy) >> magnify) as usize;
            let base = self.sprite_pattern_table + (pattern_no << 3) + line;
            for px in 0..dimension {
                let col = sx + px;
                if (0..256).contains(&col) {
                    let px2 = (px >> magnify) as usize;
                    let byte = self.vram(base + if px2 >= 8 { 16 } else { 0 });
                    if byte & (0x80 >> (px2 & 7)) != 0 {
                        let col = col as usize;
                        if buffer[col] == 0 {
                            buffer[col] = sprite_color + 1;
                        } else {
                            collision = true;
                        }
                    }
                }
            }
        }
        (collision, false, 0)
    }

    fn render_scanline(&mut self, y: u32) {
        let draw_width = if self.text_mode { 240u32 } else { 256 };
        let h_border = (FB_WIDTH - draw_width) / 2;
        let fb_base = (y * FB_WIDTH) as usize;
        let bg = self.bg_color;

        let mut collision = false;
        let mut fifth_sprite = false;
        let mut fifth_sprite_index = 0u8;

        if (TOP_BORDER..TOP_BORDER + DRAW_HEIGHT).contains(&y) && self.display_on {
            let y1 = (y - TOP_BORDER) as usize;
            let mut sprite_buffer = [0u8; 256];
            if !self.text_mode {
                (collision, fifth_sprite, fifth_sprite_index) =
                    self.scan_sprites(y1, &mut sprite_buffer);
            }

            let row_offset = if self.text_mode {
                (y1 >> 3) * 40
            } else {
                (y1 >> 3) << 5
            };
            let line_offset = y1 & 7;

            for x in 0..FB_WIDTH {
                let color = if (h_border..h_border + draw_width).contains(&x) {
                    let x1 = (x - h_border) as usize;
                    let mut color = self.tile_color(x1, y1, row_offset, line_offset);
                    if color == 0 {
                        color = bg;
                    }
                    if !self.text_mode && sprite_buffer[x1] >= 2 {
                        color = sprite_buffer[x1] - 1;
                    }
                    color
                } else {
                    bg
                };
                self.framebuffer[fb_base + x as usize] = self.color_to_argb(color);
            }
        } else {
            let argb = self.color_to_argb(bg);
            for x in 0..FB_WIDTH as usize {
                self.framebuffer[fb_base + x] = argb;
            }
        }

        if y == TOP_BORDER + DRAW_HEIGHT {
            self.status |= 0x80;
        }
        if collision {
            self.status |= 0x20;
        }
        if self.status & 0x40 == 0 {
            self.status = if fifth_sprite {
                (self.status & 0xE0) | 0x40 | (fifth_sprite_index & 0x1F)
            } else {
                (self.status & 0xE0) | 0x1F
            };
        }
    }

    fn tile_color(&self, x1: usize, y1: usize, row_offset: usize, line_offset: usize) -> u8 {
        match self.screen_mode {
            ScreenMode::Graphics => {
                let name = usize::from(self.vram(self.name_table + row_offset + (x1 >> 3)));
                let color_byte = self.vram(self.color_table + (name >> 3));
                let pattern = self.vram(self.pattern_table + (name << 3) + line_offset);
                if pattern & (0x80 >> (x1 & 7)) != 0 {
                    color_byte >> 4
                } else {
                    color_byte & 0x0F
                }
            }
            ScreenMode::Bitmap => {
                let name = usize::from(self.vram(self.name_table + row_offset + (x1 >> 3)));
                let offset = ((y1 & 0xC0) << 5) + (name << 3);
                let color_byte =
                    self.vram(self.color_table + (offset & self.color_table_mask) + line_offset);
                let pattern = self
                    .vram(self.pattern_table + (offset & self.pattern_table_mask) + line_offset);
                if pattern & (0x80 >> (x1 & 7)) != 0 {
                    color_byte >> 4
                } else {
                    color_byte & 0x0F
                }
            }
            ScreenMode::Multicolor => {
                let name = usize::from(self.vram(self.name_table + row_offset + (x1 >> 3)));
                let block_line = (y1 & 0x1C) >> 2;
                let pattern = self.vram(self.pattern_table + (name << 3) + block_line);
                if x1 & 4 == 0 { pattern >> 4 } else { pattern & 0x0F }
            }
            ScreenMode::Text => {
                let name = usize::from(self.vram(self.name_table + row_offset + x1 / 6));
                let pattern = self.vram(self.pattern_table + (name << 3) + line_offset);
                if pattern & (0x80 >> (x1 % 6)) != 0 {
                    self.fg_color
                } else {
                    self.bg_color
                }
            }
            ScreenMode::BitmapText => {
                let name = usize::from(self.vram(self.name_table + row_offset + x1 / 6));
                let offset = ((y1 & 0xC0) << 5) + (name << 3);
                let pattern = self
                    .vram(self.pattern_table + (offset & self.pattern_table_mask) + line_offset);
                if pattern & (0x80 >> (x1 % 6)) != 0 {
                    self.fg_color
                } else {
                    self.bg_color
                }
            }
            ScreenMode::BitmapMulticolor => {
                let name = usize::from(self.vram(self.name_table + row_offset + (x1 >> 3)));
                let block_line = (y1 & 0x1C) >> 2;
                let offset = ((y1 & 0xC0) << 5) + (name << 3);
                let pattern =
                    self.vram(self.pattern_table + (offset & self.pattern_table_mask) + block_line);
                if x1 & 4 == 0 { pattern >> 4 } else { pattern & 0x0F }
            }
            ScreenMode::Illegal => {
                if x1 & 4 == 0 {
                    self.fg_color
                } else {
                    self.bg_color
                }
            }
        }
    }
}

impl VideoProcessor for F18a {
    fn reset(&mut self) {
        self.ram.fill(0);
        self.registers = [0; REG_COUNT];
        for (i, entry) in self.palette_ram.iter_mut().enumerate() {
            *entry = PALETTE_RGB12[i & 0x0F];
        }
        self.address = 0;
        self.latch = false;
        self.prefetch = 0;
        self.status = 0;
        self.unlocked = false;
        self.unlock_writes = 0;
        self.palette_index = 0;
        self.palette_first_byte = None;
        self.gpu = Tms9900::new();
        self.gpu.set_idle(true);
        self.sync_derived_state();
        let border = self.color_to_argb(7);
        self.framebuffer.fill(border);
    }

    fn init_frame(&mut self) {}

    fn draw_scanline(&mut self, y: u32) {
        self.render_scanline(y);
    }

    fn draw_invisible_scanline(&mut self, _y: u32) {}

    fn update_canvas(&mut self) {}

    fn write_address(&mut self, value: u8) {
        if self.latch {
            match value >> 6 {
                0 => {
                    self.address = (u16::from(value & 0x3F) << 8) | (self.address & 0x00FF);
                    self.prefetch = self.ram[usize::from(self.address)];
                    self.address = self.address.wrapping_add(1) & 0x3FFF;
                }
                1 => {
                    self.address = (u16::from(value & 0x3F) << 8) | (self.address & 0x00FF);
                }
                _ => {
                    // Full 6-bit register number, unlike the stock chip
                    let data = (self.address & 0x00FF) as u8;
                    self.write_register(usize::from(value & 0x3F), data);
                }
            }
            self.latch = false;
        } else {
            self.address = (self.address & 0xFF00) | u16::from(value);
            self.latch = true;
        }
    }

    fn write_data(&mut self, value: u8) {
        if self.registers[VR_PALETTE_CONTROL] & 0x80 != 0 {
            self.write_palette_data(value);
            return;
        }
        self.ram[usize::from(self.address)] = value;
        self.address = self.address.wrapping_add(1) & self.ram_mask;
    }

    fn read_status(&mut self) -> u8 {
        self.latch = false;
        match self.status_select {
            0 => {
                let value = self.status;
                self.status = STATUS_IDLE;
                value
            }
            // Chip identification
            1 => 0xE0,
            // Coprocessor run state
            2 => {
                if self.gpu.is_idle() {
                    0x00
                } else {
                    0x80
                }
            }
            _ => 0,
        }
    }

    fn read_data(&mut self) -> u8 {
        let value = self.prefetch;
        self.prefetch = self.ram[usize::from(self.address)];
        self.address = self.address.wrapping_add(1) & self.ram_mask;
        value
    }

    fn interrupt_pending(&self) -> bool {
        self.interrupts_on && self.status & 0x80 != 0
    }

    fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    fn gpu_mut(&mut self) -> Option<&mut Tms9900> {
        Some(&mut self.gpu)
    }

    fn run_gpu(&mut self, budget: u32, skip_breakpoint: bool) {
        if self.gpu.is_idle() {
            return;
        }
        let mut bus = GpuBus {
            ram: &mut self.ram,
            palette: &mut self.palette_ram,
            registers: &mut self.registers,
        };
        self.gpu.run(&mut bus, budget, skip_breakpoint);
        self.sync_derived_state();
    }

    fn variant(&self) -> VdpVariant {
        VdpVariant::F18a
    }
}

impl Stateful for F18a {
    fn get_state(&self) -> serde_json::Value {
        json!({
            "registers": self.registers.to_vec(),
            "palette": self.palette_ram.to_vec(),
            "address": self.address,
            "latch": self.latch,
            "prefetch": self.prefetch,
            "status": self.status,
            "flicker": self.flicker,
            "unlocked": self.unlocked,
            "unlockWrites": self.unlock_writes,
            "paletteIndex": self.palette_index,
            "paletteFirstByte": self.palette_first_byte,
            "gpu": self.gpu.get_state(),
            "ram": state_bytes(&self.ram),
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) {
        if let Some(regs) = state.get("registers").and_then(serde_json::Value::as_array) {
            for (i, v) in regs.iter().take(REG_COUNT).enumerate() {
                if let Some(v) = v.as_u64() {
                    self.registers[i] = v as u8;
                }
            }
        }
        if let Some(pal) = state.get("palette").and_then(serde_json::Value::as_array) {
            for (i, v) in pal.iter().take(PALETTE_SIZE).enumerate() {
                if let Some(v) = v.as_u64() {
                    self.palette_ram[i] = v as u16 & 0x0FFF;
                }
            }
        }
        if let Some(addr) = state.get("address").and_then(serde_json::Value::as_u64) {
            self.address = addr as u16 & 0x3FFF;
        }
        if let Some(latch) = state.get("latch").and_then(serde_json::Value::as_bool) {
            self.latch = latch;
        }
        if let Some(b) = state.get("prefetch").and_then(serde_json::Value::as_u64) {
            self.prefetch = b as u8;
        }
        if let Some(b) = state.get("status").and_then(serde_json::Value::as_u64) {
            self.status = b as u8;
        }
        if let Some(f) = state.get("flicker").and_then(serde_json::Value::as_bool) {
            self.flicker = f;
        }
        if let Some(u) = state.get("unlocked").and_then(serde_json::Value::as_bool) {
            self.unlocked = u;
        }
        if let Some(n) = state.get("unlockWrites").and_then(serde_json::Value::as_u64) {
            self.unlock_writes = n as u8;
        }
        if let Some(n) = state.get("paletteIndex").and_then(serde_json::Value::as_u64) {
            self.palette_index = n as u8;
        }
        match state.get("paletteFirstByte") {
            Some(serde_json::Value::Null) => self.palette_first_byte = None,
            Some(v) => {
                if let Some(n) = v.as_u64() {
                    self.palette_first_byte = Some(n as u8);
                }
            }
            None => {}
        }
        if let Some(gpu) = state.get("gpu") {
            self.gpu.restore_state(gpu);
        }
        if let Some(ram) = state_get_bytes(state, "ram") {
            if ram.len() == RAM_SIZE {
                self.ram = ram;
            }
        }
        self.sync_derived_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reg(vdp: &mut F18a, reg: u8, value: u8) {
        vdp.write_address(value);
        vdp.write_address(0x80 | reg);
    }

    fn set_write_address(vdp: &mut F18a, addr: u16) {
        vdp.write_address((addr & 0xFF) as u8);
        vdp.write_address(0x40 | ((addr >> 8) & 0x3F) as u8);
    }

    fn unlock(vdp: &mut F18a) {
        write_reg(vdp, 57, UNLOCK_VALUE);
        write_reg(vdp, 57, UNLOCK_VALUE);
    }

    #[test]
    fn boots_locked_with_stock_register_decode() {
        let mut vdp = F18a::new(false);
        assert!(!vdp.is_unlocked());
        // While locked, register 30 aliases to base register 6
        write_reg(&mut vdp, 30, 0x03);
        assert_eq!(vdp.sprite_pattern_table, 0x1800);
        assert_eq!(vdp.sprite_limit, 0);
    }

    #[test]
    fn unlock_takes_two_consecutive_writes() {
        let mut vdp = F18a::new(false);
        write_reg(&mut vdp, 57, UNLOCK_VALUE);
        // An interleaved write restarts the sequence
        write_reg(&mut vdp, 2, 0x01);
        write_reg(&mut vdp, 57, UNLOCK_VALUE);
        assert!(!vdp.is_unlocked());
        write_reg(&mut vdp, 57, UNLOCK_VALUE);
        assert!(vdp.is_unlocked());
    }

    #[test]
    fn wrong_value_resets_the_sequence() {
        let mut vdp = F18a::new(false);
        write_reg(&mut vdp, 57, UNLOCK_VALUE);
        write_reg(&mut vdp, 57, 0x00);
        write_reg(&mut vdp, 57, UNLOCK_VALUE);
        assert!(!vdp.is_unlocked());
    }

    #[test]
    fn any_lock_register_write_relocks() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        assert!(vdp.is_unlocked());
        write_reg(&mut vdp, 57, 0x55);
        assert!(!vdp.is_unlocked());
    }

    #[test]
    fn extended_registers_reachable_once_unlocked() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        write_reg(&mut vdp, 30, 8);
        assert_eq!(vdp.sprite_limit, 8);
        // Base register 6 untouched
        assert_eq!(vdp.sprite_pattern_table, 0);
    }

    #[test]
    fn palette_loads_through_the_data_port() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        // DPM + auto-increment, starting at entry 0
        write_reg(&mut vdp, 47, 0xC0);
        let parked = vdp.address;
        vdp.write_data(0x0F);
        vdp.write_data(0xFF);
        vdp.write_data(0x01);
        vdp.write_data(0x23);
        assert_eq!(vdp.palette_ram[0], 0xFFF);
        assert_eq!(vdp.palette_ram[1], 0x123);
        assert_eq!(vdp.address, parked, "data port bypasses VRAM while DPM is on");
        // Dropping DPM restores normal data writes
        write_reg(&mut vdp, 47, 0x00);
        set_write_address(&mut vdp, 0x1000);
        vdp.write_data(0xAB);
        assert_eq!(vdp.peek(0x1000), 0xAB);
    }

    #[test]
    fn palette_index_holds_without_auto_increment() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        write_reg(&mut vdp, 47, 0x80 | 0x05);
        vdp.write_data(0x02);
        vdp.write_data(0x46);
        vdp.write_data(0x0A);
        vdp.write_data(0xCE);
        assert_eq!(vdp.palette_ram[5], 0xACE, "second entry overwrites the first");
    }

    #[test]
    fn sprite_limit_overrides_the_stock_cap() {
        let mut vdp = F18a::new(true);
        write_reg(&mut vdp, 1, 0xC0);
        write_reg(&mut vdp, 5, 0x10);
        write_reg(&mut vdp, 6, 0x00);
        set_write_address(&mut vdp, 0x0000);
        for _ in 0..8 {
            vdp.write_data(0xFF);
        }
        set_write_address(&mut vdp, 0x0800);
        for i in 0..6u16 {
            vdp.write_data(0xFF);
            vdp.write_data((i * 8) as u8);
            vdp.write_data(0);
            vdp.write_data(0x0F);
        }
        vdp.write_data(SPRITE_TERMINATOR);

        // Flicker cap of 4 would flag six sprites; VR30 lifts it to 8
        unlock(&mut vdp);
        write_reg(&mut vdp, 30, 8);
        vdp.draw_scanline(TOP_BORDER);
        assert_eq!(vdp.read_status() & 0x40, 0);

        write_reg(&mut vdp, 30, 2);
        vdp.draw_scanline(TOP_BORDER);
        let status = vdp.read_status();
        assert_eq!(status & 0x40, 0x40);
        assert_eq!(status & 0x1F, 2, "first sprite past the lowered cap");
    }

    #[test]
    fn status_select_reads_id_and_gpu_state() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        write_reg(&mut vdp, 15, 1);
        assert_eq!(vdp.read_status(), 0xE0, "identification register");
        write_reg(&mut vdp, 15, 2);
        assert_eq!(vdp.read_status(), 0x00, "coprocessor stopped");
        write_reg(&mut vdp, 15, 0);
        let _ = vdp.read_status();
        assert_eq!(vdp.read_status(), STATUS_IDLE, "back to the base status");
    }

    #[test]
    fn gpu_executes_from_vram() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        // LI R1,>0005 / MOV R1,@>3F00 / IDLE at 0x0100
        set_write_address(&mut vdp, 0x0100);
        for word in [0x0201u16, 0x0005, 0xC801, 0x3F00, 0x0340] {
            vdp.write_data((word >> 8) as u8);
            vdp.write_data((word & 0xFF) as u8);
        }
        write_reg(&mut vdp, 54, 0x01);
        write_reg(&mut vdp, 55, 0x00);
        write_reg(&mut vdp, 15, 2);
        assert_eq!(vdp.read_status(), 0x80, "loading the PC starts the GPU");

        vdp.run_gpu(200, true);
        assert_eq!(vdp.peek(0x3F00), 0x00);
        assert_eq!(vdp.peek(0x3F01), 0x05, "big-endian store into VRAM");
        assert_eq!(vdp.read_status(), 0x00, "IDLE parks the GPU");
    }

    #[test]
    fn gpu_stop_and_go() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        // JMP $ at 0x0200
        set_write_address(&mut vdp, 0x0200);
        vdp.write_data(0x10);
        vdp.write_data(0xFF);
        write_reg(&mut vdp, 54, 0x02);
        write_reg(&mut vdp, 55, 0x00);
        vdp.run_gpu(100, true);
        assert!(vdp.gpu_mut().is_some_and(|gpu| !gpu.is_idle()));
        write_reg(&mut vdp, 56, 0x00);
        assert!(vdp.gpu_mut().is_some_and(|gpu| gpu.is_idle()));
        write_reg(&mut vdp, 56, 0x01);
        assert!(vdp.gpu_mut().is_some_and(|gpu| !gpu.is_idle()));
    }

    #[test]
    fn gpu_can_write_the_register_file() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        // LI R1,>00F4 / MOV R1,@>6006 / IDLE: lands 0xF4 in VR7
        set_write_address(&mut vdp, 0x0100);
        for word in [0x0201u16, 0x00F4, 0xC801, 0x6006, 0x0340] {
            vdp.write_data((word >> 8) as u8);
            vdp.write_data((word & 0xFF) as u8);
        }
        write_reg(&mut vdp, 54, 0x01);
        write_reg(&mut vdp, 55, 0x00);
        vdp.run_gpu(200, true);
        assert_eq!(vdp.fg_color, 0x0F, "derived state resyncs after the run");
        assert_eq!(vdp.bg_color, 0x04);
    }

    #[test]
    fn state_round_trip_keeps_palette_and_lock() {
        let mut vdp = F18a::new(false);
        unlock(&mut vdp);
        write_reg(&mut vdp, 47, 0xC0);
        vdp.write_data(0x01);
        vdp.write_data(0x23);
        write_reg(&mut vdp, 30, 8);

        let state = vdp.get_state();
        let mut other = F18a::new(false);
        other.restore_state(&state);

        assert!(other.is_unlocked());
        assert_eq!(other.palette_ram[0], 0x123);
        assert_eq!(other.sprite_limit, 8);
    }
}
