//! Minimal RIFF/WAVE writer for 16-bit mono PCM.
//!
//! Used to hand the master track to encoders and audio sinks that expect a
//! container rather than raw samples.

use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use crate::decoder::PcmBuffer;

const HEADER_LEN: u32 = 44;
const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Convert a float sample to signed 16-bit, asymmetric so that -1.0 maps to
/// `i16::MIN` and 1.0 to `i16::MAX`.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn header_bytes(sample_rate: u32, data_len: u32) -> [u8; HEADER_LEN as usize] {
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; HEADER_LEN as usize];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(HEADER_LEN - 8 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

fn sample_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| sample_to_i16(sample).to_le_bytes())
        .collect()
}

/// Write a complete WAV file for `buffer` into `writer`.
pub fn write_wav<W: Write>(writer: &mut W, buffer: &PcmBuffer) -> io::Result<()> {
    writer.write_all(&encode_wav(buffer))
}

/// Encode `buffer` as an in-memory WAV file.
pub fn encode_wav(buffer: &PcmBuffer) -> Vec<u8> {
    let data_len = (buffer.len() * 2) as u32;
    let mut out = Vec::with_capacity(HEADER_LEN as usize + buffer.len() * 2);
    out.extend_from_slice(&header_bytes(buffer.sample_rate(), data_len));
    out.extend(sample_bytes(buffer.samples()));
    out
}

/// Keeps the most recent buffer's WAV on disk so reopening the same buffer
/// (seek, resume) does not rewrite it.
///
/// Entries are keyed by the buffer's `Arc`, which the cache holds on to, so a
/// different buffer can never match a stale file.
#[derive(Debug, Default)]
pub struct TempWavCache {
    entry: Mutex<Option<(Arc<PcmBuffer>, Arc<NamedTempFile>)>>,
}

impl TempWavCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// WAV file holding `buffer`, written on first use.
    pub fn file_for(&self, buffer: &Arc<PcmBuffer>) -> io::Result<Arc<NamedTempFile>> {
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached, file)) = entry.as_ref() {
            if Arc::ptr_eq(cached, buffer) {
                return Ok(file.clone());
            }
        }

        let file = tempfile::Builder::new()
            .prefix("mawsooah-")
            .suffix(".wav")
            .tempfile()?;
        {
            let mut writer = BufWriter::new(file.as_file());
            write_wav(&mut writer, buffer)?;
            writer.flush()?;
        }
        tracing::debug!(path = %file.path().display(), samples = buffer.len(), "Wrote playback WAV");

        let file = Arc::new(file);
        *entry = Some((buffer.clone(), file.clone()));
        Ok(file)
    }
}

/// Incremental WAV writer. Sizes in the header are patched on
/// [`WavWriter::finalize`].
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    data_len: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    /// Write a placeholder header and start the data chunk.
    pub fn new(mut inner: W, sample_rate: u32) -> io::Result<Self> {
        inner.write_all(&header_bytes(sample_rate, 0))?;
        Ok(Self { inner, data_len: 0 })
    }

    /// Append samples to the data chunk.
    pub fn write(&mut self, samples: &[f32]) -> io::Result<()> {
        self.inner.write_all(&sample_bytes(samples))?;
        self.data_len = self.data_len.saturating_add((samples.len() * 2) as u32);
        Ok(())
    }

    /// Number of samples written so far.
    pub fn samples_written(&self) -> usize {
        self.data_len as usize / 2
    }

    /// Patch the RIFF and data sizes and return the underlying writer.
    pub fn finalize(mut self) -> io::Result<W> {
        self.inner.seek(SeekFrom::Start(4))?;
        self.inner
            .write_all(&(HEADER_LEN - 8 + self.data_len).to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(40))?;
        self.inner.write_all(&self.data_len.to_le_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}
