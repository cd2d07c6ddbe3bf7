//! WAV export
//!
//! Renders frames from a chip and writes them as a 16-bit stereo WAV
//! file at the chip's native sample rate. Available with the
//! `export-wav` feature.

use std::path::Path;

use crate::chip::{Ymf262, SAMPLE_RATE};
use crate::{Result, Ymf262Error};

/// Render `frame_count` stereo frames into a fresh interleaved buffer
pub fn render_frames(chip: &mut Ymf262, frame_count: usize) -> Vec<f32> {
    let mut samples = vec![0.0f32; frame_count * 2];
    chip.generate_samples(&mut samples);
    samples
}

/// Render `frame_count` frames from `chip` and write them to a WAV
/// file at `output_path`
pub fn export_to_wav<P: AsRef<Path>>(
    chip: &mut Ymf262,
    frame_count: usize,
    output_path: P,
) -> Result<()> {
    let samples = render_frames(chip, frame_count);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output_path.as_ref(), spec)
        .map_err(|e| Ymf262Error::AudioFile(format!("failed to create WAV file: {e}")))?;

    for &sample in &samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| Ymf262Error::AudioFile(format!("failed to write sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| Ymf262Error::AudioFile(format!("failed to finalize WAV file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_frames_length_and_silence() {
        let mut chip = Ymf262::new();
        let samples = render_frames(&mut chip, 100);
        assert_eq!(samples.len(), 200);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_export_writes_a_wav_file() {
        let mut chip = Ymf262::new();
        chip.write_register(0x20, 0x21);
        chip.write_register(0x23, 0x21);
        chip.write_register(0x60, 0xF0);
        chip.write_register(0x63, 0xF0);
        chip.write_register(0xA0, 0x98);
        chip.write_register(0xB0, 0x31);

        let path = std::env::temp_dir().join("ymf262_export_test.wav");
        export_to_wav(&mut chip, 256, &path).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        // 44-byte header plus 256 stereo 16-bit frames
        assert!(metadata.len() >= 44 + 256 * 4);
        std::fs::remove_file(&path).unwrap();
    }
}
