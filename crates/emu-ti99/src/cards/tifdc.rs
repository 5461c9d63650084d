//! TI floppy disk controller card.
//!
//! An FD1771-style controller at CRU base 0x1100 with its DSR ROM in the
//! 0x4000 window and the chip registers at 0x5FF0-0x5FFE. The controller's
//! data lines are wired inverted on this card, so register reads and
//! writes complement the byte on the way through; the ROM itself reads
//! straight.

use emu_core::{Stateful, state_bytes, state_get_bytes};
use serde_json::{Value, json};

use crate::cards::{DsrCard, PeripheralCard};
use crate::disk::{DiskDrive, SECTOR_SIZE};

const STATUS_BUSY: u8 = 0x01;
const STATUS_DRQ: u8 = 0x02;
const STATUS_NOT_READY: u8 = 0x80;

/// The disk controller card with its three drive bays.
pub struct TiFdc {
    dsr: Vec<u8>,
    rom_enabled: bool,
    drives: [DiskDrive; 3],
    drive_select: [bool; 3],
    side: u8,
    track: u8,
    track_register: u8,
    sector_register: u8,
    data_register: u8,
    busy: bool,
    drq: bool,
    step_out: bool,
    writing: bool,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl TiFdc {
    /// CRU base address of the card.
    pub const CRU_BASE: u16 = 0x1100;

    #[must_use]
    pub fn new(dsr: Vec<u8>) -> Self {
        Self {
            dsr,
            rom_enabled: false,
            drives: [
                DiskDrive::new("DSK1"),
                DiskDrive::new("DSK2"),
                DiskDrive::new("DSK3"),
            ],
            drive_select: [false; 3],
            side: 0,
            track: 0,
            track_register: 0,
            sector_register: 0,
            data_register: 0,
            busy: false,
            drq: false,
            step_out: true,
            writing: false,
            buffer: Vec::new(),
            buffer_pos: 0,
        }
    }

    #[must_use]
    pub fn drive(&self, index: usize) -> Option<&DiskDrive> {
        self.drives.get(index)
    }

    pub fn drive_mut(&mut self, index: usize) -> Option<&mut DiskDrive> {
        self.drives.get_mut(index)
    }

    fn selected_drive(&self) -> Option<usize> {
        self.drive_select.iter().position(|&selected| selected)
    }

    fn status(&self) -> u8 {
        let mut status = 0;
        if self.busy {
            status |= STATUS_BUSY;
        }
        if self.drq {
            status |= STATUS_DRQ;
        }
        let ready = self
            .selected_drive()
            .is_some_and(|index| self.drives[index].has_disk());
        if !ready {
            status |= STATUS_NOT_READY;
        }
        status
    }

    fn command(&mut self, cmd: u8) {
        match cmd >> 4 {
            0x0 => {
                // Restore: head to track 0.
                self.track = 0;
                self.track_register = 0;
                self.step_out = true;
                self.busy = false;
                self.drq = false;
            }
            0x1 => {
                // Seek to the track in the data register.
                self.track = self.data_register;
                self.track_register = self.data_register;
                self.busy = false;
                self.drq = false;
            }
            0x2 | 0x3 => {
                // Step in the last direction; bit 4 updates the register.
                if self.step_out {
                    self.track = self.track.saturating_sub(1);
                } else {
                    self.track = self.track.saturating_add(1);
                }
                if cmd & 0x10 != 0 {
                    self.track_register = self.track;
                }
            }
            0x4 | 0x5 => {
                self.step_out = false;
                self.track = self.track.saturating_add(1);
                if cmd & 0x10 != 0 {
                    self.track_register = self.track;
                }
            }
            0x6 | 0x7 => {
                self.step_out = true;
                self.track = self.track.saturating_sub(1);
                if cmd & 0x10 != 0 {
                    self.track_register = self.track;
                }
            }
            0x8 | 0x9 => self.begin_read(),
            0xA | 0xB => self.begin_write(),
            0xD => {
                // Force interrupt: terminate any command.
                self.busy = false;
                self.drq = false;
                self.writing = false;
                self.buffer.clear();
                self.buffer_pos = 0;
            }
            _ => {
                self.busy = false;
                self.drq = false;
            }
        }
    }

    fn begin_read(&mut self) {
        let sector = self.selected_drive().and_then(|index| {
            self.drives[index]
                .image()
                .and_then(|image| image.read_sector(self.side, self.track, self.sector_register))
                .map(<[u8]>::to_vec)
        });
        if let Some(data) = sector {
            self.buffer = data;
            self.buffer_pos = 0;
            self.writing = false;
            self.busy = true;
            self.drq = true;
        } else {
            self.busy = false;
            self.drq = false;
        }
    }

    fn begin_write(&mut self) {
        if self.selected_drive().is_none() {
            self.busy = false;
            self.drq = false;
            return;
        }
        self.buffer = Vec::with_capacity(SECTOR_SIZE);
        self.buffer_pos = 0;
        self.writing = true;
        self.busy = true;
        self.drq = true;
    }

    fn read_data(&mut self) -> u8 {
        if !self.writing && self.buffer_pos < self.buffer.len() {
            let byte = self.buffer[self.buffer_pos];
            self.buffer_pos += 1;
            if self.buffer_pos == self.buffer.len() {
                self.busy = false;
                self.drq = false;
            }
            self.data_register = byte;
        }
        self.data_register
    }

    fn write_data(&mut self, byte: u8) {
        self.data_register = byte;
        if !self.writing {
            return;
        }
        self.buffer.push(byte);
        if self.buffer.len() == SECTOR_SIZE {
            if let Some(index) = self.selected_drive() {
                let side = self.side;
                let track = self.track;
                let sector = self.sector_register;
                if let Some(image) = self.drives[index].image_mut() {
                    image.write_sector(side, track, sector, &self.buffer);
                }
            }
            self.writing = false;
            self.busy = false;
            self.drq = false;
        }
    }
}

impl PeripheralCard for TiFdc {
    fn id(&self) -> &'static str {
        "TIFDC"
    }

    fn cru_base(&self) -> u16 {
        Self::CRU_BASE
    }

    fn read_cru_bit(&mut self, bit: u16) -> bool {
        match bit {
            0 => self.rom_enabled,
            4..=6 => self.drive_select[usize::from(bit) - 4],
            7 => self.side != 0,
            _ => false,
        }
    }

    fn write_cru_bit(&mut self, bit: u16, value: bool) {
        match bit {
            0 => self.rom_enabled = value,
            4..=6 => self.drive_select[usize::from(bit) - 4] = value,
            7 => self.side = u8::from(value),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.rom_enabled = false;
        self.drive_select = [false; 3];
        self.side = 0;
        self.track = 0;
        self.track_register = 0;
        self.sector_register = 0;
        self.data_register = 0;
        self.busy = false;
        self.drq = false;
        self.step_out = true;
        self.writing = false;
        self.buffer.clear();
        self.buffer_pos = 0;
    }
}

impl DsrCard for TiFdc {
    fn rom_enabled(&self) -> bool {
        self.rom_enabled
    }

    fn read_word(&mut self, addr: u16) -> u16 {
        let register = match addr {
            0x5FF0 => Some(self.status()),
            0x5FF2 => Some(self.track_register),
            0x5FF4 => Some(self.sector_register),
            0x5FF6 => Some(self.read_data()),
            _ => None,
        };
        if let Some(value) = register {
            return u16::from(!value) << 8;
        }
        let offset = usize::from(addr - 0x4000);
        let high = self.dsr.get(offset).copied().unwrap_or(0);
        let low = self.dsr.get(offset + 1).copied().unwrap_or(0);
        u16::from_be_bytes([high, low])
    }

    fn write_word(&mut self, addr: u16, value: u16) {
        let byte = !(value >> 8) as u8;
        match addr {
            0x5FF8 => self.command(byte),
            0x5FFA => self.track_register = byte,
            0x5FFC => self.sector_register = byte,
            0x5FFE => self.write_data(byte),
            _ => {}
        }
    }
}

impl Stateful for TiFdc {
    fn get_state(&self) -> Value {
        let drives: Vec<Value> = self.drives.iter().map(Stateful::get_state).collect();
        json!({
            "romEnabled": self.rom_enabled,
            "driveSelect": self.drive_select,
            "side": self.side,
            "track": self.track,
            "trackRegister": self.track_register,
            "sectorRegister": self.sector_register,
            "dataRegister": self.data_register,
            "busy": self.busy,
            "drq": self.drq,
            "stepOut": self.step_out,
            "writing": self.writing,
            "buffer": state_bytes(&self.buffer),
            "bufferPos": self.buffer_pos,
            "drives": drives,
        })
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(enabled) = state.get("romEnabled").and_then(Value::as_bool) {
            self.rom_enabled = enabled;
        }
        if let Some(select) = state.get("driveSelect").and_then(Value::as_array) {
            for (i, value) in select.iter().take(3).enumerate() {
                self.drive_select[i] = value.as_bool().unwrap_or(false);
            }
        }
        if let Some(side) = state.get("side").and_then(Value::as_u64) {
            self.side = side as u8;
        }
        if let Some(track) = state.get("track").and_then(Value::as_u64) {
            self.track = track as u8;
        }
        if let Some(track) = state.get("trackRegister").and_then(Value::as_u64) {
            self.track_register = track as u8;
        }
        if let Some(sector) = state.get("sectorRegister").and_then(Value::as_u64) {
            self.sector_register = sector as u8;
        }
        if let Some(data) = state.get("dataRegister").and_then(Value::as_u64) {
            self.data_register = data as u8;
        }
        if let Some(busy) = state.get("busy").and_then(Value::as_bool) {
            self.busy = busy;
        }
        if let Some(drq) = state.get("drq").and_then(Value::as_bool) {
            self.drq = drq;
        }
        if let Some(out) = state.get("stepOut").and_then(Value::as_bool) {
            self.step_out = out;
        }
        if let Some(writing) = state.get("writing").and_then(Value::as_bool) {
            self.writing = writing;
        }
        if let Some(buffer) = state_get_bytes(state, "buffer") {
            self.buffer = buffer;
        }
        if let Some(pos) = state.get("bufferPos").and_then(Value::as_u64) {
            self.buffer_pos = pos as usize;
        }
        if let Some(drives) = state.get("drives").and_then(Value::as_array) {
            for (drive, drive_state) in self.drives.iter_mut().zip(drives) {
                drive.restore_state(drive_state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskImage;

    // Software talks to the 1771 through the inverted data bus.
    fn read_register(fdc: &mut TiFdc, addr: u16) -> u8 {
        !(fdc.read_word(addr) >> 8) as u8
    }

    fn write_register(fdc: &mut TiFdc, addr: u16, byte: u8) {
        fdc.write_word(addr, u16::from(!byte) << 8);
    }

    fn make_fdc() -> TiFdc {
        let mut fdc = TiFdc::new(vec![0; 0x2000]);
        let mut data = vec![0u8; 40 * 9 * SECTOR_SIZE];
        let offset = (5 * 9 + 2) * SECTOR_SIZE;
        data[offset] = 0x42;
        let image = DiskImage::single_sided(data).unwrap();
        fdc.drive_mut(0).unwrap().insert(image);
        fdc.write_cru_bit(0, true);
        fdc.write_cru_bit(4, true);
        fdc
    }

    #[test]
    fn status_reports_not_ready_without_a_disk() {
        let mut fdc = TiFdc::new(Vec::new());
        fdc.write_cru_bit(4, true);
        assert_eq!(read_register(&mut fdc, 0x5FF0), STATUS_NOT_READY);

        let mut fdc = make_fdc();
        assert_eq!(read_register(&mut fdc, 0x5FF0), 0);
    }

    #[test]
    fn seek_and_step_move_the_head() {
        let mut fdc = make_fdc();
        write_register(&mut fdc, 0x5FFE, 5);
        write_register(&mut fdc, 0x5FF8, 0x10);
        assert_eq!(read_register(&mut fdc, 0x5FF2), 5);

        // Step in with track update, then step repeats the direction.
        write_register(&mut fdc, 0x5FF8, 0x50);
        assert_eq!(read_register(&mut fdc, 0x5FF2), 6);
        write_register(&mut fdc, 0x5FF8, 0x30);
        assert_eq!(read_register(&mut fdc, 0x5FF2), 7);

        write_register(&mut fdc, 0x5FF8, 0x00);
        assert_eq!(read_register(&mut fdc, 0x5FF2), 0);
    }

    #[test]
    fn read_sector_streams_256_bytes_then_clears_busy() {
        let mut fdc = make_fdc();
        write_register(&mut fdc, 0x5FFE, 5);
        write_register(&mut fdc, 0x5FF8, 0x10);
        write_register(&mut fdc, 0x5FFC, 2);
        write_register(&mut fdc, 0x5FF8, 0x80);
        assert_eq!(
            read_register(&mut fdc, 0x5FF0),
            STATUS_BUSY | STATUS_DRQ
        );

        let first = read_register(&mut fdc, 0x5FF6);
        assert_eq!(first, 0x42);
        for _ in 1..SECTOR_SIZE {
            read_register(&mut fdc, 0x5FF6);
        }
        assert_eq!(read_register(&mut fdc, 0x5FF0), 0);
    }

    #[test]
    fn write_sector_commits_after_a_full_buffer() {
        let mut fdc = make_fdc();
        write_register(&mut fdc, 0x5FFC, 0);
        write_register(&mut fdc, 0x5FF8, 0xA0);
        for i in 0..SECTOR_SIZE {
            write_register(&mut fdc, 0x5FFE, i as u8);
        }
        assert_eq!(read_register(&mut fdc, 0x5FF0), 0);
        let image = fdc.drive(0).unwrap().image().unwrap();
        assert_eq!(image.read_sector(0, 0, 0).unwrap()[255], 255);
        assert!(image.is_dirty());
    }

    #[test]
    fn missing_sector_aborts_the_read() {
        let mut fdc = make_fdc();
        write_register(&mut fdc, 0x5FFC, 42);
        write_register(&mut fdc, 0x5FF8, 0x80);
        assert_eq!(read_register(&mut fdc, 0x5FF0), 0);
    }

    #[test]
    fn dsr_rom_reads_are_not_inverted() {
        let mut dsr = vec![0; 0x2000];
        dsr[0] = 0xAA;
        dsr[1] = 0x55;
        let mut fdc = TiFdc::new(dsr);
        assert_eq!(fdc.read_word(0x4000), 0xAA55);
    }

    #[test]
    fn state_round_trips() {
        let mut fdc = make_fdc();
        write_register(&mut fdc, 0x5FFE, 5);
        write_register(&mut fdc, 0x5FF8, 0x10);
        write_register(&mut fdc, 0x5FFC, 2);
        write_register(&mut fdc, 0x5FF8, 0x80);

        let state = fdc.get_state();
        let mut restored = TiFdc::new(vec![0; 0x2000]);
        restored.restore_state(&state);
        assert_eq!(read_register(&mut restored, 0x5FF6), 0x42);
        assert!(restored.drive(0).unwrap().has_disk());
    }
}
