//! In-memory disk drive model.
//!
//! Disks are raw sector images: 256-byte sectors addressed by side,
//! track and sector number. Images are injected as byte vectors with
//! explicit geometry; file-format parsing happens outside the emulator.

use emu_core::{Stateful, state_bytes, state_get_bytes};
use serde_json::{Value, json};

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 256;

/// A raw sector image with geometry.
#[derive(Clone)]
pub struct DiskImage {
    data: Vec<u8>,
    tracks: u8,
    sectors_per_track: u8,
    sides: u8,
    dirty: bool,
}

impl DiskImage {
    /// Wrap a raw image. The data length must match the geometry exactly.
    pub fn new(data: Vec<u8>, tracks: u8, sectors_per_track: u8, sides: u8) -> Result<Self, String> {
        let expected =
            SECTOR_SIZE * usize::from(tracks) * usize::from(sectors_per_track) * usize::from(sides);
        if data.len() != expected {
            return Err(format!(
                "disk image is {} bytes, geometry {}x{}x{} needs {}",
                data.len(),
                sides,
                tracks,
                sectors_per_track,
                expected
            ));
        }
        Ok(Self {
            data,
            tracks,
            sectors_per_track,
            sides,
            dirty: false,
        })
    }

    /// Single-sided single-density 90K image (40 tracks, 9 sectors).
    pub fn single_sided(data: Vec<u8>) -> Result<Self, String> {
        Self::new(data, 40, 9, 1)
    }

    fn offset(&self, side: u8, track: u8, sector: u8) -> Option<usize> {
        if side >= self.sides || track >= self.tracks || sector >= self.sectors_per_track {
            return None;
        }
        let sectors_per_side = usize::from(self.tracks) * usize::from(self.sectors_per_track);
        let index = usize::from(side) * sectors_per_side
            + usize::from(track) * usize::from(self.sectors_per_track)
            + usize::from(sector);
        Some(index * SECTOR_SIZE)
    }

    /// Read one sector, or `None` if the address is outside the geometry.
    #[must_use]
    pub fn read_sector(&self, side: u8, track: u8, sector: u8) -> Option<&[u8]> {
        let offset = self.offset(side, track, sector)?;
        Some(&self.data[offset..offset + SECTOR_SIZE])
    }

    /// Write one sector and mark the image dirty. Returns false if the
    /// address is outside the geometry or the buffer is not sector-sized.
    pub fn write_sector(&mut self, side: u8, track: u8, sector: u8, bytes: &[u8]) -> bool {
        if bytes.len() != SECTOR_SIZE {
            return false;
        }
        let Some(offset) = self.offset(side, track, sector) else {
            return false;
        };
        self.data[offset..offset + SECTOR_SIZE].copy_from_slice(bytes);
        self.dirty = true;
        true
    }

    /// True once any sector has been written since load or `clear_dirty`.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Acknowledge a save of the image.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn tracks(&self) -> u8 {
        self.tracks
    }

    #[must_use]
    pub fn sectors_per_track(&self) -> u8 {
        self.sectors_per_track
    }

    #[must_use]
    pub fn sides(&self) -> u8 {
        self.sides
    }
}

/// One drive bay: a name and an optional inserted image.
pub struct DiskDrive {
    name: String,
    image: Option<DiskImage>,
}

impl DiskDrive {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            image: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, image: DiskImage) {
        self.image = Some(image);
    }

    pub fn eject(&mut self) -> Option<DiskImage> {
        self.image.take()
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.image.is_some()
    }

    #[must_use]
    pub fn image(&self) -> Option<&DiskImage> {
        self.image.as_ref()
    }

    pub fn image_mut(&mut self) -> Option<&mut DiskImage> {
        self.image.as_mut()
    }
}

impl Stateful for DiskDrive {
    fn get_state(&self) -> Value {
        match &self.image {
            Some(image) => json!({
                "name": self.name,
                "data": state_bytes(&image.data),
                "tracks": image.tracks,
                "sectorsPerTrack": image.sectors_per_track,
                "sides": image.sides,
                "dirty": image.dirty,
            }),
            None => json!({ "name": self.name }),
        }
    }

    fn restore_state(&mut self, state: &Value) {
        if let Some(name) = state.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        let Some(data) = state_get_bytes(state, "data") else {
            self.image = None;
            return;
        };
        let tracks = state.get("tracks").and_then(Value::as_u64).unwrap_or(40) as u8;
        let sectors =
            state.get("sectorsPerTrack").and_then(Value::as_u64).unwrap_or(9) as u8;
        let sides = state.get("sides").and_then(Value::as_u64).unwrap_or(1) as u8;
        if let Ok(mut image) = DiskImage::new(data, tracks, sectors, sides) {
            image.dirty = state.get("dirty").and_then(Value::as_bool).unwrap_or(false);
            self.image = Some(image);
        }
    }
}
