//! Payload codecs
//!
//! Each namespace stores one kind of artifact, chosen when the store is
//! opened. Structured entries are JSON text. Audio entries are the raw
//! frame from [`AudioArtifact`] pushed through zlib, streamed in 16 KiB
//! chunks on both the write and the read side.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::audio::AudioArtifact;
use super::errors::{CacheError, DecodeError};
use super::finite::ensure_finite;

/// Compressor block size
pub const STREAM_CHUNK_SIZE: usize = 16 * 1024;

/// A value that can be stored in the cache
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Structured(Value),
    Audio(AudioArtifact),
}

impl Artifact {
    /// Build a structured artifact from any serializable value
    ///
    /// NaN and infinities are rejected rather than stored as `null`.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self, CacheError> {
        ensure_finite(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        serde_json::to_value(value)
            .map(Artifact::Structured)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Extract a structured artifact as a concrete type
    pub fn into_structured<T: DeserializeOwned>(self) -> Result<T, CacheError> {
        match self {
            Artifact::Structured(value) => serde_json::from_value(value)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            Artifact::Audio(_) => Err(CacheError::Serialization(
                "expected a structured artifact, found audio".into(),
            )),
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Artifact::Structured(value) => Some(value),
            Artifact::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioArtifact> {
        match self {
            Artifact::Audio(audio) => Some(audio),
            Artifact::Structured(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Artifact::Structured(_) => "structured",
            Artifact::Audio(_) => "audio",
        }
    }
}

impl From<AudioArtifact> for Artifact {
    fn from(audio: AudioArtifact) -> Self {
        Artifact::Audio(audio)
    }
}

impl From<Value> for Artifact {
    fn from(value: Value) -> Self {
        Artifact::Structured(value)
    }
}

/// Serialization strategy for one namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// JSON text, key order preserved
    Structured,
    /// Raw audio frame, zlib-compressed
    BinaryAudio,
}

impl Codec {
    /// Encode an artifact into `writer`
    ///
    /// Fails with `Serialization` when the artifact kind does not match the
    /// codec or the payload violates its invariants.
    pub fn encode<W: Write>(&self, artifact: &Artifact, writer: W) -> Result<(), CacheError> {
        match (self, artifact) {
            (Codec::Structured, Artifact::Structured(value)) => {
                serde_json::to_writer(writer, value)
                    .map_err(|e| CacheError::Serialization(e.to_string()))
            }
            (Codec::BinaryAudio, Artifact::Audio(audio)) => {
                let frame = audio.to_frame()?;
                compress(&frame, writer)
                    .map_err(|e| CacheError::Serialization(format!("compression failed: {}", e)))
            }
            (codec, other) => Err(CacheError::Serialization(format!(
                "{:?} codec cannot encode a {} artifact",
                codec,
                other.kind()
            ))),
        }
    }

    /// Encode an artifact into a fresh buffer
    pub fn encode_to_vec(&self, artifact: &Artifact) -> Result<Vec<u8>, CacheError> {
        let mut buf = Vec::new();
        self.encode(artifact, &mut buf)?;
        Ok(buf)
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> Result<Artifact, DecodeError> {
        match self {
            Codec::Structured => Ok(Artifact::Structured(serde_json::from_slice(bytes)?)),
            Codec::BinaryAudio => {
                let frame = decompress(bytes)?;
                Ok(Artifact::Audio(AudioArtifact::from_frame(&frame)?))
            }
        }
    }
}

fn compress<W: Write>(data: &[u8], writer: W) -> std::io::Result<()> {
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    for chunk in data.chunks(STREAM_CHUNK_SIZE) {
        encoder.write_all(chunk)?;
    }
    encoder.finish()?.flush()
}

fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}
