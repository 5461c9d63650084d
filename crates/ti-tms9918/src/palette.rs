//! TMS9918A hardware palette.
//!
//! 16 colours as ARGB32. Index 0 is "transparent": the renderer
//! substitutes the backdrop colour before lookup, so the black entry here
//! is only ever seen when the backdrop itself is 0.

/// TMS9918A palette: 16 colours indexed 0-15 in ARGB32 format.
pub const PALETTE: [u32; 16] = [
    0xFF00_0000, // 0: Transparent
    0xFF00_0000, // 1: Black
    0xFF21_C842, // 2: Medium Green
    0xFF5E_DC78, // 3: Light Green
    0xFF54_55ED, // 4: Dark Blue
    0xFF7D_76FC, // 5: Light Blue
    0xFFD4_524D, // 6: Dark Red
    0xFF42_EBF5, // 7: Cyan
    0xFFFC_5554, // 8: Medium Red
    0xFFFF_7978, // 9: Light Red
    0xFFD4_C154, // 10: Dark Yellow
    0xFFE6_CE80, // 11: Light Yellow
    0xFF21_B03B, // 12: Dark Green
    0xFFC9_5BBA, // 13: Magenta
    0xFFCC_CCCC, // 14: Grey
    0xFFFF_FFFF, // 15: White
];

/// The same 16 colours as 12-bit 0xRGB entries, the F18A's power-on
/// palette RAM contents (repeated across all four banks).
pub const PALETTE_RGB12: [u16; 16] = [
    0x000, 0x000, 0x2C4, 0x5D7, 0x55E, 0x77F, 0xD54, 0x4EF, 0xF55, 0xF77, 0xDC5, 0xEC8, 0x2B3,
    0xC5B, 0xCCC, 0xFFF,
];

/// Expand a 12-bit 0xRGB palette entry (F18A palette RAM) to ARGB32.
#[must_use]
pub fn argb_from_rgb12(rgb: u16) -> u32 {
    let r = u32::from((rgb >> 8) & 0xF) * 17;
    let g = u32::from((rgb >> 4) & 0xF) * 17;
    let b = u32::from(rgb & 0xF) * 17;
    0xFF00_0000 | (r << 16) | (g << 8) | b
}

/// Expand a 9-bit 3:3:3 palette entry (V9938 palette registers) to ARGB32.
#[must_use]
pub fn argb_from_rgb9(r: u8, g: u8, b: u8) -> u32 {
    let scale = |v: u8| u32::from(v & 7) * 255 / 7;
    0xFF00_0000 | (scale(r) << 16) | (scale(g) << 8) | scale(b)
}
