//! Headless capture: PNG screenshots and WAV audio dumps.

#![allow(clippy::cast_possible_truncation)]

use std::error::Error;
use std::fs;
use std::path::Path;

use ti_tms9918::{FB_HEIGHT, FB_WIDTH};

use crate::Ti99;
use crate::console::AUDIO_SAMPLE_RATE;

/// Save the current framebuffer as a PNG file.
///
/// The framebuffer is ARGB32 (`u32` array). This converts to RGBA bytes
/// for the PNG encoder.
pub fn save_screenshot(machine: &Ti99, path: &Path) -> Result<(), Box<dyn Error>> {
    let fb = machine.framebuffer();

    let file = fs::File::create(path)?;
    let w = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, FB_WIDTH, FB_HEIGHT);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    writer.write_image_data(&argb_to_rgba(fb))?;
    Ok(())
}

/// Convert ARGB32 pixels to RGBA bytes at full alpha.
#[must_use]
pub fn argb_to_rgba(fb: &[u32]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(fb.len() * 4);
    for &pixel in fb {
        rgba.push(((pixel >> 16) & 0xFF) as u8);
        rgba.push(((pixel >> 8) & 0xFF) as u8);
        rgba.push((pixel & 0xFF) as u8);
        rgba.push(0xFF);
    }
    rgba
}

/// Save audio samples as a WAV file (mono, 48 kHz, 16-bit PCM).
///
/// Input samples are f32 in the range -1.0 to +1.0.
pub fn save_audio(samples: &[f32], path: &Path) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: AUDIO_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * f32::from(i16::MAX)) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Record video + audio: dump frames as PNGs plus a combined WAV.
pub fn record(machine: &mut Ti99, dir: &Path, num_frames: u32) -> Result<(), Box<dyn Error>> {
    let frames_dir = dir.join("frames");
    fs::create_dir_all(&frames_dir)?;

    let mut all_audio: Vec<f32> = Vec::new();

    for i in 1..=num_frames {
        machine.run_frame(false);
        all_audio.extend(machine.take_audio_samples());
        let filename = frames_dir.join(format!("{i:06}.png"));
        save_screenshot(machine, &filename)?;
    }

    if !all_audio.is_empty() {
        let audio_path = dir.join("audio.wav");
        save_audio(&all_audio, &audio_path)?;
        eprintln!("Audio saved to {}", audio_path.display());
    }

    eprintln!("Captured {num_frames} frames to {}", frames_dir.display());
    Ok(())
}
