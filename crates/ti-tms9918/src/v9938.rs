//! Yamaha V9938.
//!
//! The MSX2-generation successor. 128K of VRAM behind a 17-bit address
//! counter (A16-A14 from R#14, the rest through the familiar 2-phase
//! latch), 6-bit register numbers, indirect register writes through
//! R#17, a 16-entry 9-bit palette loaded through its own port pair, and
//! selectable status registers. Rendering covers the 9918-compatible
//! modes through the palette; the vertical sprite-duplication bug of the
//! original part is not reproduced.

use emu_core::{Stateful, state_bytes, state_get_bytes};
use serde_json::json;

use crate::palette::argb_from_rgb9;
use crate::{FB_HEIGHT, FB_WIDTH, ScreenMode, VdpVariant, VideoProcessor};

const RAM_SIZE: usize = 0x2_0000;
const ADDRESS_MASK: u32 = (RAM_SIZE as u32) - 1;
const DRAW_HEIGHT: u32 = 192;
const TOP_BORDER: u32 = (FB_HEIGHT - DRAW_HEIGHT) / 2;
const SPRITE_TERMINATOR: u8 = 0xD0;
const STATUS_IDLE: u8 = 0x1F;

const REG_COUNT: usize = 64;
const PALETTE_SIZE: usize = 16;

/// Power-on palette, 3-bit R/G/B per entry, approximating the 9918 colours.
const DEFAULT_PALETTE: [(u8, u8, u8); PALETTE_SIZE] = [
    (0, 0, 0),
    (0, 0, 0),
    (1, 6, 1),
    (3, 7, 3),
    (1, 1, 7),
    (2, 3, 7),
    (5, 1, 1),
    (2, 6, 7),
    (7, 1, 1),
    (7, 3, 3),
    (6, 6, 1),
    (6, 6, 4),
    (1, 4, 1),
    (6, 2, 5),
    (5, 5, 5),
    (7, 7, 7),
];

/// Yamaha V9938 VDP.
pub struct V9938 {
    ram: Vec<u8>,
    registers: [u8; REG_COUNT],
    /// 9-bit entries, packed 0b0RRRGGGBBB.
    palette_ram: [u16; PALETTE_SIZE],
    /// Full 17-bit address counter.
    address: u32,
    latch: bool,
    prefetch: u8,
    status: u8,
    flicker: bool,

    status_select: u8,
    palette_index: u8,
    /// First byte of a palette pair (red and blue fields).
    palette_first_byte: Option<u8>,
    indirect_register: u8,
    indirect_auto_inc: bool,

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
    fg_color: u8,
    bg_color: u8,

    framebuffer: Vec<u32>,
}

impl V9938 {
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
            status_select: 0,
            palette_index: 0,
            palette_first_byte: None,
            indirect_register: 0,
            indirect_auto_inc: true,
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
    pub fn peek(&self, addr: u32) -> u8 {
        self.ram[(addr & ADDRESS_MASK) as usize]
    }

    fn vram(&self, addr: usize) -> u8 {
        self.ram[addr & (RAM_SIZE - 1)]
    }

    fn write_register(&mut self, reg: usize, value: u8) {
        self.registers[reg] = value;
        match reg {
            14 => {
                // A16-A14 of the address counter
                self.address = (self.address & 0x3FFF) | (u32::from(value & 0x07) << 14);
            }
            15 => self.status_select = value & 0x0F,
            16 => {
                self.palette_index = value & 0x0F;
                self.palette_first_byte = None;
            }
            17 => {
                self.indirect_register = value & 0x3F;
                self.indirect_auto_inc = value & 0x80 == 0;
            }
            _ => self.sync_derived_state(),
        }
    }

    /// Recompute the mode enumeration, table pointers and masks. Table
    /// pointers use the full V9938 register widths (R#2/R#10/R#11 carry
    /// the extra VRAM address bits); the bitmap-mode mask formulas keep
    /// the 9918 shape on the low 14 bits.
    fn sync_derived_state(&mut self) {
        let r1 = self.registers[1];
        self.display_on = r1 & 0x40 != 0;
        self.interrupts_on = r1 & 0x20 != 0;
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

        let ct_high = usize::from(self.registers[10] & 0x07) << 14;
        self.name_table = usize::from(self.registers[2] & 0x7F) << 10;
        if self.bitmap_mode {
            self.color_table = ct_high | (usize::from(self.registers[3] & 0x80) << 6);
            self.pattern_table = usize::from(self.registers[4] & 0x3C) << 11;
        } else {
            self.color_table = ct_high | (usize::from(self.registers[3]) << 6);
            self.pattern_table = usize::from(self.registers[4] & 0x3F) << 11;
        }
        self.sprite_attribute_table = (usize::from(self.registers[11] & 0x03) << 15)
            | (usize::from(self.registers[5]) << 7);
        self.sprite_pattern_table = usize::from(self.registers[6] & 0x3F) << 11;

        match self.screen_mode {
            ScreenMode::Bitmap => {
                self.color_table_mask = (usize::from(self.registers[3] & 0x7F) << 6) | 0x3F;
                self.pattern_table_mask =
                    (usize::from(self.registers[4] & 0x03) << 11) | (self.color_table_mask & 0x7FF);
            }
            ScreenMode::BitmapText | ScreenMode::BitmapMulticolor => {
                self.color_table_mask = RAM_SIZE - 1;
                self.pattern_table_mask = (usize::from(self.registers[4] & 0x03) << 11) | 0x7FF;
            }
            _ => {
                self.color_table_mask = RAM_SIZE - 1;
                self.pattern_table_mask = RAM_SIZE - 1;
            }
        }
    }

    fn color_to_argb(&self, color: u8) -> u32 {
        let entry = self.palette_ram[usize::from(color & 0x0F)];
        argb_from_rgb9(((entry >> 6) & 7) as u8, ((entry >> 3) & 7) as u8, (entry & 7) as u8)
    }

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
            if y1 < sy || y1 >= sy + dimension {
                continue;
            }

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
            let line = ((y1 - sy) >> magnify) as usize;
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

impl VideoProcessor for V9938 {
    fn reset(&mut self) {
        self.ram.fill(0);
        self.registers = [0; REG_COUNT];
        for (entry, &(r, g, b)) in self.palette_ram.iter_mut().zip(DEFAULT_PALETTE.iter()) {
            *entry = (u16::from(r) << 6) | (u16::from(g) << 3) | u16::from(b);
        }
        self.address = 0;
        self.latch = false;
        self.prefetch = 0;
        self.status = 0;
        self.status_select = 0;
        self.palette_index = 0;
        self.palette_first_byte = None;
        self.indirect_register = 0;
        self.indirect_auto_inc = true;
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
                    // A13-A8; A16-A14 stay as R#14 set them
                    self.address =
                        (self.address & !0x3FFF) | (u32::from(value & 0x3F) << 8)
                            | (self.address & 0x00FF);
                    self.prefetch = self.ram[(self.address & ADDRESS_MASK) as usize];
                    self.address = self.address.wrapping_add(1) & ADDRESS_MASK;
                }
                1 => {
                    self.address = (self.address & !0x3FFF)
                        | (u32::from(value & 0x3F) << 8)
                        | (self.address & 0x00FF);
                }
                _ => {
                    let data = (self.address & 0x00FF) as u8;
                    self.write_register(usize::from(value & 0x3F), data);
                }
            }
            self.latch = false;
        } else {
            self.address = (self.address & !0xFF) | u32::from(value);
            self.latch = true;
        }
    }

    fn write_data(&mut self, value: u8) {
        self.ram[(self.address & ADDRESS_MASK) as usize] = value;
        self.address = self.address.wrapping_add(1) & ADDRESS_MASK;
    }

    fn read_status(&mut self) -> u8 {
        self.latch = false;
        match self.status_select {
            0 => {
                let value = self.status;
                self.status = STATUS_IDLE;
                value
            }
            // S#1: chip identification field reads zero on this part
            1 => 0x00,
            // S#2: transfer-ready bit held high
            2 => 0x80,
            _ => 0,
        }
    }

    fn read_data(&mut self) -> u8 {
        let value = self.prefetch;
        self.prefetch = self.ram[(self.address & ADDRESS_MASK) as usize];
        self.address = self.address.wrapping_add(1) & ADDRESS_MASK;
        value
    }

    fn write_palette_port(&mut self, value: u8) {
        if let Some(rb) = self.palette_first_byte.take() {
            let r = u16::from((rb >> 4) & 0x07);
            let b = u16::from(rb & 0x07);
            let g = u16::from(value & 0x07);
            self.palette_ram[usize::from(self.palette_index)] = (r << 6) | (g << 3) | b;
            self.palette_index = (self.palette_index + 1) & 0x0F;
        } else {
            self.palette_first_byte = Some(value);
        }
    }

    fn write_indirect_port(&mut self, value: u8) {
        let reg = usize::from(self.indirect_register);
        if reg != 17 {
            self.write_register(reg, value);
        }
        if self.indirect_auto_inc {
            self.indirect_register = (self.indirect_register + 1) & 0x3F;
        }
    }

    fn interrupt_pending(&self) -> bool {
        self.interrupts_on && self.status & 0x80 != 0
    }

    fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    fn variant(&self) -> VdpVariant {
        VdpVariant::V9938
    }
}

impl Stateful for V9938 {
    fn get_state(&self) -> serde_json::Value {
        json!({
            "registers": self.registers.to_vec(),
            "palette": self.palette_ram.to_vec(),
            "address": self.address,
            "latch": self.latch,
            "prefetch": self.prefetch,
            "status": self.status,
            "flicker": self.flicker,
            "paletteIndex": self.palette_index,
            "paletteFirstByte": self.palette_first_byte,
            "indirectRegister": self.indirect_register,
            "indirectAutoInc": self.indirect_auto_inc,
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
                    self.palette_ram[i] = v as u16 & 0x01FF;
                }
            }
        }
        if let Some(addr) = state.get("address").and_then(serde_json::Value::as_u64) {
            self.address = addr as u32 & ADDRESS_MASK;
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
        if let Some(n) = state.get("paletteIndex").and_then(serde_json::Value::as_u64) {
            self.palette_index = n as u8 & 0x0F;
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
        if let Some(n) = state.get("indirectRegister").and_then(serde_json::Value::as_u64) {
            self.indirect_register = n as u8 & 0x3F;
        }
        if let Some(b) = state.get("indirectAutoInc").and_then(serde_json::Value::as_bool) {
            self.indirect_auto_inc = b;
        }
        if let Some(ram) = state_get_bytes(state, "ram") {
            if ram.len() == RAM_SIZE {
                self.ram = ram;
            }
        }
        self.status_select = self.registers[15] & 0x0F;
        self.sync_derived_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reg(vdp: &mut V9938, reg: u8, value: u8) {
        vdp.write_address(value);
        vdp.write_address(0x80 | reg);
    }

    fn set_write_address(vdp: &mut V9938, addr: u16) {
        vdp.write_address((addr & 0xFF) as u8);
        vdp.write_address(0x40 | ((addr >> 8) & 0x3F) as u8);
    }

    #[test]
    fn r14_supplies_the_upper_address_bits() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 14, 0x01);
        set_write_address(&mut vdp, 0x0000);
        vdp.write_data(0xAA);
        assert_eq!(vdp.peek(0x4000), 0xAA, "bit 14 comes from R#14");
        write_reg(&mut vdp, 14, 0x04);
        set_write_address(&mut vdp, 0x0010);
        vdp.write_data(0xBB);
        assert_eq!(vdp.peek(0x1_0010), 0xBB, "bit 16 comes from R#14");
    }

    #[test]
    fn address_counter_carries_across_16k_banks() {
        let mut vdp = V9938::new(false);
        set_write_address(&mut vdp, 0x3FFF);
        vdp.write_data(0x11);
        vdp.write_data(0x22);
        assert_eq!(vdp.peek(0x3FFF), 0x11);
        assert_eq!(vdp.peek(0x4000), 0x22, "increment carries into A14");
        assert_eq!(vdp.address, 0x4001);
    }

    #[test]
    fn address_wraps_at_128k() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 14, 0x07);
        set_write_address(&mut vdp, 0x3FFF);
        vdp.write_data(0x33);
        assert_eq!(vdp.address, 0, "17-bit counter wraps to zero");
    }

    #[test]
    fn indirect_port_walks_the_register_file() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 17, 0x02);
        vdp.write_indirect_port(0x01);
        vdp.write_indirect_port(0x09);
        assert_eq!(vdp.name_table, 0x0400, "first write lands in R#2");
        assert_eq!(vdp.registers[3], 0x09, "pointer advanced to R#3");
    }

    #[test]
    fn indirect_port_can_hold_one_register() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 17, 0x82); // bit 7 disables auto-increment
        vdp.write_indirect_port(0x01);
        vdp.write_indirect_port(0x03);
        assert_eq!(vdp.registers[2], 0x03, "both writes hit R#2");
        assert_eq!(vdp.registers[3], 0x00);
    }

    #[test]
    fn indirect_write_to_r17_is_discarded() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 17, 0x11); // pointer at R#17 itself
        vdp.write_indirect_port(0x22);
        assert_eq!(vdp.indirect_register, 0x12, "pointer still advances");
        assert_eq!(vdp.registers[17] & 0x3F, 0x11, "R#17 unchanged");
    }

    #[test]
    fn palette_port_pair_loads_an_entry() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 16, 0x03);
        vdp.write_palette_port(0x17); // red 1, blue 7
        vdp.write_palette_port(0x02); // green 2
        assert_eq!(vdp.palette_ram[3], (1 << 6) | (2 << 3) | 7);
        assert_eq!(vdp.palette_index, 4, "index auto-increments per entry");
    }

    #[test]
    fn border_renders_through_the_palette() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 7, 0x04); // backdrop entry 4
        write_reg(&mut vdp, 16, 0x04);
        vdp.write_palette_port(0x70); // red 7, blue 0
        vdp.write_palette_port(0x00); // green 0
        vdp.draw_scanline(0);
        assert_eq!(vdp.framebuffer[0], argb_from_rgb9(7, 0, 0));
    }

    #[test]
    fn status_select_via_r15() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 15, 1);
        assert_eq!(vdp.read_status(), 0x00, "identification");
        write_reg(&mut vdp, 15, 2);
        assert_eq!(vdp.read_status(), 0x80, "transfer ready");
        write_reg(&mut vdp, 15, 0);
        let _ = vdp.read_status();
        assert_eq!(vdp.read_status(), STATUS_IDLE, "base status resets on read");
    }

    #[test]
    fn frame_interrupt_matches_the_family_timing() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 1, 0xE0);
        vdp.draw_scanline(215);
        assert!(!vdp.interrupt_pending());
        vdp.draw_scanline(216);
        assert!(vdp.interrupt_pending());
        let _ = vdp.read_status();
        assert!(!vdp.interrupt_pending());
    }

    #[test]
    fn state_round_trip_keeps_palette_and_pointers() {
        let mut vdp = V9938::new(false);
        write_reg(&mut vdp, 14, 0x02);
        write_reg(&mut vdp, 16, 0x05);
        vdp.write_palette_port(0x34);
        vdp.write_palette_port(0x06);
        set_write_address(&mut vdp, 0x0100);
        vdp.write_data(0x77);

        let state = vdp.get_state();
        let mut other = V9938::new(false);
        other.restore_state(&state);

        assert_eq!(other.palette_ram[5], (3 << 6) | (6 << 3) | 4);
        assert_eq!(other.address, vdp.address);
        assert_eq!(other.peek(0x8100), 0x77);
    }
}
