//! Audio artifacts and their on-disk frame
//!
//! An audio entry is a raw framed dump of the waveform:
//!
//! ```text
//! magic "MXAU" | version u16 | sample_rate u32 | channels u32 | frames u64 | samples
//! ```
//!
//! All integers and samples are little-endian, samples are `f32` stored
//! channel after channel. The frame is exact: decoding yields the same bits
//! that were encoded. The codec layer compresses this frame losslessly.

use super::errors::{CacheError, DecodeError};

const MAGIC: &[u8; 4] = b"MXAU";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4 + 8;

/// Most channels a frame may declare
pub const MAX_CHANNELS: usize = u16::MAX as usize;

/// Decoded audio: sample rate plus a (channel, frame) sample matrix
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    /// Samples per second, always > 0 for a valid artifact
    pub sample_rate: u32,
    /// Outer dimension is channels, inner dimension is frames
    pub waveform: Vec<Vec<f32>>,
}

impl AudioArtifact {
    pub fn new(sample_rate: u32, waveform: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            waveform,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.waveform.len()
    }

    pub fn frame_count(&self) -> usize {
        self.waveform.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Down-mix all channels to one by averaging
    ///
    /// `None` when the channels differ in length.
    pub fn to_mono(&self) -> Option<Vec<f32>> {
        let frames = self.frame_count();
        if self.waveform.iter().any(|ch| ch.len() != frames) {
            return None;
        }
        let channels = self.channel_count();
        if channels <= 1 {
            return Some(self.waveform.first().cloned().unwrap_or_default());
        }
        let mono = (0..frames)
            .map(|i| self.waveform.iter().map(|ch| ch[i]).sum::<f32>() / channels as f32)
            .collect();
        Some(mono)
    }

    /// Check the invariants the frame relies on
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.sample_rate == 0 {
            return Err(CacheError::Serialization(
                "sample rate must be greater than zero".into(),
            ));
        }
        if self.waveform.is_empty() {
            return Err(CacheError::Serialization(
                "waveform has no channels".into(),
            ));
        }
        if self.waveform.len() > MAX_CHANNELS {
            return Err(CacheError::Serialization(format!(
                "{} channels, at most {} are supported",
                self.waveform.len(),
                MAX_CHANNELS
            )));
        }
        let frames = self.frame_count();
        if let Some((idx, ch)) = self
            .waveform
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != frames)
        {
            return Err(CacheError::Serialization(format!(
                "channel {} has {} frames, expected {}",
                idx,
                ch.len(),
                frames
            )));
        }
        Ok(())
    }

    /// Serialize into the raw frame
    pub(crate) fn to_frame(&self) -> Result<Vec<u8>, CacheError> {
        self.validate()?;

        let channels = self.channel_count();
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(HEADER_LEN + channels * frames * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&(channels as u32).to_le_bytes());
        out.extend_from_slice(&(frames as u64).to_le_bytes());
        for channel in &self.waveform {
            for sample in channel {
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Parse a raw frame; any deviation from the layout is an error
    pub(crate) fn from_frame(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Frame(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[0..4] != MAGIC {
            return Err(DecodeError::Frame("bad magic".into()));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(DecodeError::Frame(format!("unsupported version {}", version)));
        }
        let sample_rate = u32::from_le_bytes(le_array(&header[6..10]));
        let channels = u32::from_le_bytes(le_array(&header[10..14])) as usize;
        let frames = u64::from_le_bytes(le_array(&header[14..22]));

        // Checked before anything is allocated from the header
        if sample_rate == 0 || channels == 0 || channels > MAX_CHANNELS {
            return Err(DecodeError::Frame(format!(
                "invalid header: rate={} channels={}",
                sample_rate, channels
            )));
        }
        let frames = usize::try_from(frames)
            .map_err(|_| DecodeError::Frame("frame count overflows".into()))?;
        let expected = channels
            .checked_mul(frames)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| DecodeError::Frame("sample count overflows".into()))?;
        if body.len() != expected {
            return Err(DecodeError::Frame(format!(
                "expected {} sample bytes, found {}",
                expected,
                body.len()
            )));
        }

        let waveform = if frames == 0 {
            vec![Vec::new(); channels]
        } else {
            body.chunks_exact(frames * 4)
                .map(|channel| {
                    channel
                        .chunks_exact(4)
                        .map(|s| f32::from_le_bytes(le_array(s)))
                        .collect()
                })
                .collect()
        };

        Ok(Self {
            sample_rate,
            waveform,
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
