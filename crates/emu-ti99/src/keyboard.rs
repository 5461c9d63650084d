//! Key matrix scanned through the CRU controller.
//!
//! Keys are injected as (column, row) coordinates by the host shell or the
//! input queue; no scancode mapping lives here. The CRU controller selects
//! a column via its output bits and reads rows back active low.

use emu_core::Stateful;
use serde_json::{Value, json};

/// Columns in the scan matrix.
pub const KEY_COLUMNS: usize = 8;
/// Rows per column.
pub const KEY_ROWS: usize = 8;

/// The 8x8 key matrix plus the alpha-lock switch.
pub struct Keyboard {
    matrix: [[bool; KEY_ROWS]; KEY_COLUMNS],
    alpha_lock: bool,
}

impl Keyboard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            matrix: [[false; KEY_ROWS]; KEY_COLUMNS],
            alpha_lock: true,
        }
    }

    /// Release every key. The alpha-lock switch is mechanical and keeps
    /// its position across reset.
    pub fn reset(&mut self) {
        self.matrix = [[false; KEY_ROWS]; KEY_COLUMNS];
    }

    /// Press or release one switch in the matrix.
    pub fn set_key(&mut self, column: u8, row: u8, pressed: bool) {
        let column = usize::from(column) & (KEY_COLUMNS - 1);
        let row = usize::from(row) & (KEY_ROWS - 1);
        self.matrix[column][row] = pressed;
    }

    #[must_use]
    pub fn is_pressed(&self, column: u8, row: u8) -> bool {
        let column = usize::from(column) & (KEY_COLUMNS - 1);
        let row = usize::from(row) & (KEY_ROWS - 1);
        self.matrix[column][row]
    }

    pub fn set_alpha_lock(&mut self, engaged: bool) {
        self.alpha_lock = engaged;
    }

    #[must_use]
    pub fn alpha_lock(&self) -> bool {
        self.alpha_lock
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Stateful for Keyboard {
    fn get_state(&self) -> Value {
        let columns: Vec<u8> = self
            .matrix
            .iter()
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &pressed)| acc | (u8::from(pressed) << i))
            })
            .collect();
        json!({
            "columns": columns,
            "alphaLock": self.alpha_lock,
        })
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(columns) = state.get("columns").and_then(Value::as_array) {
            for (column, bits) in columns.iter().take(KEY_COLUMNS).enumerate() {
                let bits = bits.as_u64().unwrap_or(0) as u8;
                for row in 0..KEY_ROWS {
                    self.matrix[column][row] = bits & (1 << row) != 0;
                }
            }
        }
        if let Some(alpha) = state.get("alphaLock").and_then(Value::as_bool) {
            self.alpha_lock = alpha;
        }
    }
}
