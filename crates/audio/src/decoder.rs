//! Speech audio decoding.
//!
//! The speech service delivers raw headerless PCM: signed 16-bit
//! little-endian, mono, 24 kHz. Decoding is a byte reinterpretation plus a
//! rescale to `[-1.0, 1.0]`; no container parsing is involved.

use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_project_model::segment::{MediaBlob, MediaBlobError};

/// Sample rate of speech audio from the upstream service.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// A mono buffer of float PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// The single concatenated track spanning all segments.
pub type MasterAudioBuffer = PcmBuffer;

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
        }
    }

    /// A buffer of `len` zero samples.
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample index for a time offset, clamped to the buffer.
    pub fn index_at(&self, secs: f64) -> usize {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        ((secs * self.sample_rate as f64).round() as usize).min(self.samples.len())
    }

    /// Samples from `secs` to the end.
    pub fn tail_from(&self, secs: f64) -> &[f32] {
        &self.samples[self.index_at(secs)..]
    }
}

/// Decode a speech blob at the upstream sample rate.
pub fn decode_pcm16(blob: &MediaBlob) -> MawsooahResult<PcmBuffer> {
    decode_pcm16_with_rate(blob, SPEECH_SAMPLE_RATE)
}

/// Decode a speech blob at an explicit sample rate.
pub fn decode_pcm16_with_rate(blob: &MediaBlob, sample_rate: u32) -> MawsooahResult<PcmBuffer> {
    let bytes = blob.bytes().map_err(|e| match e {
        MediaBlobError::Empty => MawsooahError::decode("audio blob is empty"),
        MediaBlobError::InvalidBase64(err) => {
            MawsooahError::decode(format!("audio blob is not valid base64: {err}"))
        }
    })?;
    Ok(decode_pcm16_bytes(&bytes, sample_rate))
}

/// Reinterpret little-endian 16-bit PCM bytes as float samples.
///
/// A trailing odd byte is dropped rather than treated as an error.
pub fn decode_pcm16_bytes(bytes: &[u8], sample_rate: u32) -> PcmBuffer {
    if bytes.len() % 2 != 0 {
        tracing::debug!(
            bytes = bytes.len(),
            "Odd PCM byte count; dropping trailing byte"
        );
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    PcmBuffer::new(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_odd_byte_count_drops_trailing_byte() {
        let blob = MediaBlob::from_bytes(vec![0x11u8; 2001]);
        let pcm = decode_pcm16(&blob).unwrap();
        assert_eq!(pcm.len(), 1000);
        assert_eq!(pcm.sample_rate(), SPEECH_SAMPLE_RATE);
    }

    #[test]
    fn test_sample_scaling() {
        let bytes = [
            0x00, 0x80, // i16::MIN
            0xff, 0x7f, // i16::MAX
            0x00, 0x00, // 0
            0x00, 0x40, // 16384
        ];
        let pcm = decode_pcm16_bytes(&bytes, SPEECH_SAMPLE_RATE);
        assert_eq!(pcm.samples()[0], -1.0);
        assert!((pcm.samples()[1] - 32767.0 / 32768.0).abs() < 1e-7);
        assert_eq!(pcm.samples()[2], 0.0);
        assert_eq!(pcm.samples()[3], 0.5);
    }

    #[test]
    fn test_base64_blob() {
        // 0x0040 little endian = 16384 -> 0.5
        let blob = MediaBlob::from_base64("AEA=");
        let pcm = decode_pcm16(&blob).unwrap();
        assert_eq!(pcm.samples(), &[0.5]);
    }

    #[test]
    fn test_empty_and_invalid_blobs_fail() {
        let empty = decode_pcm16(&MediaBlob::from_bytes(Vec::new())).unwrap_err();
        assert!(matches!(empty, MawsooahError::Decode { .. }));

        let invalid = decode_pcm16(&MediaBlob::from_base64("%%%")).unwrap_err();
        assert!(invalid.to_string().contains("base64"));
    }

    #[test]
    fn test_duration_and_indexing() {
        let pcm = PcmBuffer::silence(48_000, SPEECH_SAMPLE_RATE);
        assert!((pcm.duration_secs() - 2.0).abs() < 1e-12);
        assert_eq!(pcm.index_at(1.0), 24_000);
        assert_eq!(pcm.index_at(-3.0), 0);
        assert_eq!(pcm.index_at(10.0), 48_000);
        assert_eq!(pcm.tail_from(1.5).len(), 12_000);
    }

    proptest! {
        #[test]
        fn prop_decoded_samples_are_normalized(bytes in prop::collection::vec(any::<u8>(), 1..512)) {
            let pcm = decode_pcm16_bytes(&bytes, SPEECH_SAMPLE_RATE);
            prop_assert_eq!(pcm.len(), bytes.len() / 2);
            prop_assert!(pcm.samples().iter().all(|s| (-1.0..1.0).contains(s)));
        }
    }
}
