//! Minimal RIFF/WAVE helpers: a mono-PCM header writer and a duration
//! reader. Hand-rolled rather than crate-backed — see SPEC_FULL.md §6 for
//! why this one surface doesn't pull in a dependency.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

const RIFF_HEADER_LEN: u32 = 44;

/// Build a 44-byte canonical WAV header for `data_len` bytes of mono PCM at
/// `sample_rate` Hz, `sample_width` bytes per sample.
pub fn build_header(data_len: u32, sample_rate: u32, sample_width: u16) -> [u8; 44] {
    let mut header = [0u8; 44];
    let byte_rate = sample_rate * sample_width as u32;
    let block_align = sample_width;
    let bits_per_sample = sample_width * 8;
    let riff_chunk_size = RIFF_HEADER_LEN - 8 + data_len;

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&1u16.to_le_bytes()); // mono
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// Wrap raw mono PCM bytes in a WAV container and write it to `path`.
pub fn write_wav(path: &Path, pcm: &[u8], sample_rate: u32, sample_width: u16) -> io::Result<()> {
    let header = build_header(pcm.len() as u32, sample_rate, sample_width);
    let mut out = Vec::with_capacity(header.len() + pcm.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(pcm);
    fs::write(path, out)
}

/// Read a WAV file's duration in seconds from its header, falling back to
/// assuming the whole file is raw headerless PCM at the given parameters if
/// no RIFF header is present.
pub fn duration_seconds(path: &Path, sample_rate: u32, sample_width: u16) -> io::Result<f64> {
    let mut file = fs::File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let (data_len, rate, width) = if buf.len() >= 44 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE"
    {
        let rate = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
        let bits = u16::from_le_bytes([buf[34], buf[35]]);
        let width = (bits / 8).max(1);
        let data_len = u32::from_le_bytes([buf[40], buf[41], buf[42], buf[43]]) as usize;
        (data_len.min(buf.len().saturating_sub(44)), rate, width)
    } else {
        (buf.len(), sample_rate, sample_width)
    };

    let frame_count = data_len as f64 / width as f64;
    Ok(frame_count / rate as f64)
}
