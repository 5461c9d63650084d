//! Stock TMS9918A.
//!
//! 16K of VRAM addressed through a 2-phase port latch, seven screen modes
//! derived from mode bits split across VR0/VR1, five table-base pointers,
//! and 32 sprites with an optional 4-per-line hardware cap. Rendering is
//! scanline at a time into an ARGB framebuffer; the frame interrupt fires
//! on the line below the active area.

use emu_core::{Stateful, state_bytes, state_get_bytes};
use serde_json::json;

use crate::palette::PALETTE;
use crate::{FB_HEIGHT, FB_WIDTH, ScreenMode, VdpVariant, VideoProcessor};

/// VRAM size.
const RAM_SIZE: usize = 0x4000;
/// Active display rows.
const DRAW_HEIGHT: u32 = 192;
/// Rows above the active area: (240 - 192) / 2.
const TOP_BORDER: u32 = (FB_HEIGHT - DRAW_HEIGHT) / 2;
/// Sprite attribute Y value that ends table processing.
const SPRITE_TERMINATOR: u8 = 0xD0;
/// Status value after a read (unused low bits read back set).
const STATUS_IDLE: u8 = 0x1F;

/// Stock TMS9918A VDP.
pub struct Tms9918a {
    ram: Vec<u8>,
    registers: [u8; 8],
    address: u16,
    latch: bool,
    prefetch: u8,
    status: u8,
    /// Enforce the hardware 4-sprites-per-line limit.
    flicker: bool,

    // Derived from the register file on every relevant write.
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

impl Tms9918a {
    #[must_use]
    pub fn new(flicker: bool) -> Self {
        let mut vdp = Self {
            ram: vec![0; RAM_SIZE],
            registers: [0; 8],
            address: 0,
            latch: false,
            prefetch: 0,
            status: 0,
            flicker,
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

    fn vram(&self, addr: usize) -> u8 {
        self.ram[addr & (RAM_SIZE - 1)]
    }

    fn write_register(&mut self, reg: usize, value: u8) {
        self.registers[reg] = value;
        match reg {
            0 => self.update_mode(),
            1 => {
                self.ram_mask = if value & 0x80 != 0 { 0x3FFF } else { 0x1FFF };
                self.display_on = value & 0x40 != 0;
                self.interrupts_on = value & 0x20 != 0;
                self.update_mode();
            }
            2 => self.name_table = usize::from(value & 0x0F) << 10,
            3 => {
                self.color_table = if self.bitmap_mode {
                    usize::from(value & 0x80) << 6
                } else {
                    usize::from(value) << 6
                };
                self.update_table_masks();
            }
            4 => {
                self.pattern_table = if self.bitmap_mode {
                    usize::from(value & 0x04) << 11
                } else {
                    usize::from(value & 0x07) << 11
                };
                self.update_table_masks();
            }
            5 => self.sprite_attribute_table = usize::from(value & 0x7F) << 7,
            6 => self.sprite_pattern_table = usize::from(value & 0x07) << 11,
            _ => {
                self.fg_color = value >> 4;
                self.bg_color = value & 0x0F;
            }
        }
    }

    /// Recompute the mode enumeration and every derived pointer from the
    /// current register values. The result depends only on those values,
    /// never on the order the registers were written in.
    fn update_mode(&mut self) {
        self.bitmap_mode = self.registers[0] & 0x02 != 0;
        self.text_mode = self.registers[1] & 0x10 != 0;
        self.screen_mode = match ((self.registers[1] & 0x18) >> 3, self.bitmap_mode) {
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
        self.update_table_masks();
    }

    /// Bitmap-mode table addressing is partially row-driven: the masks cut
    /// register bits out of the color/pattern lookups.
    fn update_table_masks(&mut self) {
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

    /// Pre-scan the sprite attribute table for one active line, painting
    /// `color + 1` into the per-column buffer (0 = no sprite). Returns
    /// (collision, fifth-sprite-seen, fifth-sprite-index).
    fn scan_sprites(&self, y1: usize, buffer: &mut [u8]) -> (bool, bool, u8) {
        let r1 = self.registers[1];
        let size16 = r1 & 0x02 != 0;
        let magnify = u32::from(r1 & 0x01);
        let dimension = (if size16 { 16i32 } else { 8 }) << magnify;
        let cap = if self.flicker { 4u32 } else { 32 };
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
                // Vertical duplication quirk for sprites 8-31 in bitmap
                // mode: Y wraps at a pattern-register-derived mask, except
                // in the 64-127 band where the raw line matches too.
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
                // Early clock shifts the sprite 32 pixels left
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
                self.framebuffer[fb_base + x as usize] = PALETTE[usize::from(color & 0x0F)];
            }
        } else {
            for x in 0..FB_WIDTH as usize {
                self.framebuffer[fb_base + x] = PALETTE[usize::from(bg & 0x0F)];
            }
        }

        if y == TOP_BORDER + DRAW_HEIGHT {
            self.status |= 0x80;
        }
        if collision {
            self.status |= 0x20;
        }
        if self.status & 0x40 == 0 {
            // Low five bits carry the fifth-sprite index once the flag is
            // up; until then they read back all ones.
            self.status = if fifth_sprite {
                (self.status & 0xE0) | 0x40 | (fifth_sprite_index & 0x1F)
            } else {
                (self.status & 0xE0) | 0x1F
            };
        }
    }

    /// Foreground color index for one pixel of the tile layer.
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

impl VideoProcessor for Tms9918a {
    fn reset(&mut self) {
        self.ram.fill(0);
        self.registers = [0; 8];
        self.address = 0;
        self.latch = false;
        self.prefetch = 0;
        self.status = 0;
        self.display_on = false;
        self.interrupts_on = false;
        self.screen_mode = ScreenMode::Graphics;
        self.bitmap_mode = false;
        self.text_mode = false;
        self.name_table = 0;
        self.color_table = 0;
        self.pattern_table = 0;
        self.sprite_attribute_table = 0;
        self.sprite_pattern_table = 0;
        self.color_table_mask = RAM_SIZE - 1;
        self.pattern_table_mask = RAM_SIZE - 1;
        self.ram_mask = 0x3FFF;
        self.fg_color = 0;
        self.bg_color = 0;
        self.framebuffer.fill(PALETTE[7]);
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
                    // Set read address and prefetch
                    self.address = (u16::from(value & 0x3F) << 8) | (self.address & 0x00FF);
                    self.prefetch = self.ram[usize::from(self.address)];
                    self.address = self.address.wrapping_add(1) & self.ram_mask;
                }
                1 => {
                    self.address = (u16::from(value & 0x3F) << 8) | (self.address & 0x00FF);
                }
                _ => {
                    // First-phase byte is the register value
                    let data = (self.address & 0x00FF) as u8;
                    self.write_register(usize::from(value & 0x07), data);
                }
            }
            self.latch = false;
        } else {
            self.address = (self.address & 0xFF00) | u16::from(value);
            self.latch = true;
        }
    }

    fn write_data(&mut self, value: u8) {
        self.ram[usize::from(self.address)] = value;
        self.address = self.address.wrapping_add(1) & self.ram_mask;
    }

    fn read_status(&mut self) -> u8 {
        let value = self.status;
        self.status = STATUS_IDLE;
        self.latch = false;
        value
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

    fn variant(&self) -> VdpVariant {
        VdpVariant::Tms9918a
    }
}

impl Stateful for Tms9918a {
    fn get_state(&self) -> serde_json::Value {
        json!({
            "registers": self.registers.to_vec(),
            "address": self.address,
            "latch": self.latch,
            "prefetch": self.prefetch,
            "status": self.status,
            "flicker": self.flicker,
            "ram": state_bytes(&self.ram),
        })
    }

    fn restore_state(&mut self, state: &serde_json::Value) {
        if let Some(regs) = state.get("registers").and_then(serde_json::Value::as_array) {
            // Replaying the writes recomputes every derived pointer
            for (i, v) in regs.iter().take(8).enumerate() {
                if let Some(v) = v.as_u64() {
                    self.write_register(i, v as u8);
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
        if let Some(ram) = state_get_bytes(state, "ram") {
            if ram.len() == RAM_SIZE {
                self.ram = ram;
            }
        }
    }
}
