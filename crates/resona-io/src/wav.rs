//! Streaming WAV file reading and writing.
//!
//! The offline engine processes files block-at-a-time, so readers and
//! writers here are streaming: [`WavBlockReader`] fills an
//! [`AudioBuffer`] one block per call and [`WavBlockWriter`] appends one
//! block per call, finalizing the header on [`finalize`](WavBlockWriter::finalize)
//! (or, best-effort, on drop).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};
use resona_core::AudioBuffer;

use crate::Result;

/// WAV audio encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV file metadata extracted without loading sample data.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Total number of sample frames (samples per channel).
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Audio encoding format.
    pub format: WavFormat,
}

/// Read WAV metadata without loading sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let total_samples = reader.len() as u64;
    let num_frames = total_samples / u64::from(spec.channels);
    let duration_secs = num_frames as f64 / f64::from(spec.sample_rate);

    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs,
        format,
    })
}

/// WAV file specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,
    /// Bit depth per sample (e.g., 16, 24, 32).
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Streaming WAV reader that fills an [`AudioBuffer`] one block per call.
pub struct WavBlockReader {
    reader: WavReader<std::io::BufReader<File>>,
    spec: WavSpec,
    total_frames: u64,
    frames_read: u64,
}

impl WavBlockReader {
    /// Opens a WAV file for streaming reads.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = WavSpec::from(reader.spec());
        let total_frames = u64::from(reader.len()) / u64::from(spec.channels.max(1));
        Ok(Self {
            reader,
            spec,
            total_frames,
            frames_read: 0,
        })
    }

    /// The file's format specification.
    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Total number of frames in the file.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frames consumed so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Reads up to `buffer.frames()` frames into the buffer.
    ///
    /// File channels are mapped onto buffer channels by index; a mono file
    /// is duplicated across all buffer channels, extra file channels are
    /// dropped. The buffer tail past the frames actually read is zeroed.
    /// Returns the number of frames read; `0` means end of file.
    pub fn read_block(&mut self, buffer: &mut AudioBuffer) -> Result<usize> {
        buffer.clear();
        let channels = usize::from(self.spec.channels.max(1));
        let capacity = buffer.frames();
        let mut frames = 0usize;

        match hound::WavSpec::from(self.spec).sample_format {
            SampleFormat::Float => {
                let mut samples = self.reader.samples::<f32>();
                'frames: while frames < capacity {
                    for ch in 0..channels {
                        let Some(sample) = samples.next() else {
                            break 'frames;
                        };
                        let value = sample?;
                        write_sample(buffer, ch, channels, frames, value);
                    }
                    frames += 1;
                }
            }
            SampleFormat::Int => {
                let scale = (1i64 << (self.spec.bits_per_sample - 1)) as f32;
                let mut samples = self.reader.samples::<i32>();
                'frames: while frames < capacity {
                    for ch in 0..channels {
                        let Some(sample) = samples.next() else {
                            break 'frames;
                        };
                        let value = sample? as f32 / scale;
                        write_sample(buffer, ch, channels, frames, value);
                    }
                    frames += 1;
                }
            }
        }

        self.frames_read += frames as u64;
        Ok(frames)
    }
}

/// Maps one file sample onto the buffer: channel-by-index, with mono files
/// duplicated across every buffer channel.
fn write_sample(buffer: &mut AudioBuffer, ch: usize, file_channels: usize, frame: usize, value: f32) {
    if file_channels == 1 {
        for c in 0..buffer.channel_count() {
            buffer.channel_mut(c)[frame] = value;
        }
    } else if ch < buffer.channel_count() {
        buffer.channel_mut(ch)[frame] = value;
    }
}

/// Streaming WAV writer that appends one [`AudioBuffer`] block per call.
pub struct WavBlockWriter {
    writer: Option<WavWriter<BufWriter<File>>>,
    spec: WavSpec,
    frames_written: u64,
}

impl WavBlockWriter {
    /// Creates a writer with an explicit specification.
    pub fn create<P: AsRef<Path>>(path: P, spec: WavSpec) -> Result<Self> {
        let writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
        Ok(Self {
            writer: Some(writer),
            spec,
            frames_written: 0,
        })
    }

    /// Creates a writer for a destination path, selecting the format from
    /// the file extension. Only `wav` is a recognized container; any other
    /// extension falls back to the default WAV float format.
    pub fn create_for_path<P: AsRef<Path>>(
        path: P,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    ) -> Result<Self> {
        let path = path.as_ref();
        let known = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if !known {
            tracing::warn!(
                path = %path.display(),
                "unrecognized output extension, falling back to WAV"
            );
        }
        Self::create(
            path,
            WavSpec {
                channels,
                sample_rate,
                bits_per_sample,
            },
        )
    }

    /// The writer's format specification.
    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Appends the first `frames` frames of the buffer.
    ///
    /// Buffer channels are mapped to file channels by index; missing buffer
    /// channels are written as silence.
    pub fn write_block(&mut self, buffer: &AudioBuffer, frames: usize) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .expect("write_block called after finalize");
        let channels = usize::from(self.spec.channels);
        let frames = frames.min(buffer.frames());

        if self.spec.bits_per_sample == 32 {
            for i in 0..frames {
                for c in 0..channels {
                    let sample = if c < buffer.channel_count() {
                        buffer.channel(c)[i]
                    } else {
                        0.0
                    };
                    writer.write_sample(sample)?;
                }
            }
        } else {
            let scale = (1i64 << (self.spec.bits_per_sample - 1)) as f32;
            for i in 0..frames {
                for c in 0..channels {
                    let sample = if c < buffer.channel_count() {
                        buffer.channel(c)[i]
                    } else {
                        0.0
                    };
                    let int = (sample * scale).clamp(-scale, scale - 1.0) as i32;
                    writer.write_sample(int)?;
                }
            }
        }

        self.frames_written += frames as u64;
        Ok(())
    }

    /// Finalizes the file header. Idempotent; also runs best-effort on drop.
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl Drop for WavBlockWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take()
            && let Err(err) = writer.finalize()
        {
            tracing::warn!(%err, "wav writer finalize failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn ramp_buffer(channels: usize, frames: usize, base: f32) -> AudioBuffer {
        let mut buf = AudioBuffer::new(channels, frames);
        for c in 0..channels {
            for (i, s) in buf.channel_mut(c).iter_mut().enumerate() {
                *s = base + i as f32 / frames as f32 * 0.5 + c as f32 * 0.1;
            }
        }
        buf
    }

    #[test]
    fn block_roundtrip_f32() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        };

        let written = ramp_buffer(2, 64, -0.2);
        {
            let mut writer = WavBlockWriter::create(file.path(), spec).unwrap();
            writer.write_block(&written, 64).unwrap();
            writer.finalize().unwrap();
            assert_eq!(writer.frames_written(), 64);
        }

        let mut reader = WavBlockReader::open(file.path()).unwrap();
        assert_eq!(reader.spec(), spec);
        assert_eq!(reader.total_frames(), 64);

        let mut block = AudioBuffer::new(2, 48);
        let first = reader.read_block(&mut block).unwrap();
        assert_eq!(first, 48);
        for c in 0..2 {
            for i in 0..48 {
                assert!((block.channel(c)[i] - written.channel(c)[i]).abs() < 1e-6);
            }
        }

        let second = reader.read_block(&mut block).unwrap();
        assert_eq!(second, 16);
        // Tail past the read frames is zeroed.
        assert_eq!(block.channel(0)[16], 0.0);

        assert_eq!(reader.read_block(&mut block).unwrap(), 0);
        assert_eq!(reader.frames_read(), 64);
    }

    #[test]
    fn block_roundtrip_i16() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
        };

        let written = ramp_buffer(1, 100, 0.0);
        {
            let mut writer = WavBlockWriter::create(file.path(), spec).unwrap();
            writer.write_block(&written, 100).unwrap();
            writer.finalize().unwrap();
        }

        let mut reader = WavBlockReader::open(file.path()).unwrap();
        let mut block = AudioBuffer::new(1, 128);
        let frames = reader.read_block(&mut block).unwrap();
        assert_eq!(frames, 100);
        for i in 0..100 {
            assert!((block.channel(0)[i] - written.channel(0)[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn mono_file_duplicates_to_all_channels() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
        };
        let mut mono = AudioBuffer::new(1, 16);
        mono.channel_mut(0).fill(0.75);
        {
            let mut writer = WavBlockWriter::create(file.path(), spec).unwrap();
            writer.write_block(&mono, 16).unwrap();
            writer.finalize().unwrap();
        }

        let mut reader = WavBlockReader::open(file.path()).unwrap();
        let mut stereo = AudioBuffer::new(2, 16);
        reader.read_block(&mut stereo).unwrap();
        assert_eq!(stereo.channel(0), &[0.75; 16]);
        assert_eq!(stereo.channel(1), &[0.75; 16]);
    }

    #[test]
    fn unknown_extension_falls_back_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.audio");
        {
            let mut writer = WavBlockWriter::create_for_path(&path, 48000, 2, 32).unwrap();
            let buf = ramp_buffer(2, 8, 0.1);
            writer.write_block(&buf, 8).unwrap();
            writer.finalize().unwrap();
        }
        let info = read_wav_info(&path).unwrap();
        assert_eq!(info.num_frames, 8);
        assert_eq!(info.format, WavFormat::IeeeFloat);
    }

    #[test]
    fn info_reports_duration() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        };
        {
            let mut writer = WavBlockWriter::create(file.path(), spec).unwrap();
            let buf = AudioBuffer::new(2, 4800);
            writer.write_block(&buf, 4800).unwrap();
            writer.finalize().unwrap();
        }
        let info = read_wav_info(file.path()).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.num_frames, 4800);
        assert!((info.duration_secs - 0.1).abs() < 1e-9);
    }
}
