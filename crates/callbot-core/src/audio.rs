//! Pure functions over raw PCM files: windowed RMS and byte-range extraction.
//!
//! Neither function mutates state or holds a file handle across calls; both
//! open, read, and close within a single call. See spec.md §4.3.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{AgentError, AgentResult};

/// Compute the root-mean-square amplitude of the last `window_seconds` of a
/// PCM file.
///
/// `sample_width` must be 1 (unsigned 8-bit, centred at 128), 2 (signed
/// 16-bit) or 4 (signed 32-bit); any other width, or a missing/empty file,
/// returns `0.0`.
pub fn rms_of_tail(path: &Path, sample_rate: u32, sample_width: u8, window_seconds: f64) -> f64 {
    if !matches!(sample_width, 1 | 2 | 4) {
        return 0.0;
    }

    let file_size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return 0.0,
    };
    if file_size == 0 {
        return 0.0;
    }

    let frame_count = (sample_rate as f64 * window_seconds) as u64;
    let mut window_bytes = frame_count * sample_width as u64;
    if window_bytes == 0 {
        return 0.0;
    }
    if window_bytes > file_size {
        window_bytes = file_size;
    }

    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return 0.0,
    };
    if file.seek(SeekFrom::End(-(window_bytes as i64))).is_err() {
        return 0.0;
    }

    let mut raw = vec![0u8; window_bytes as usize];
    if file.read_exact(&mut raw).is_err() {
        return 0.0;
    }

    let sum_sq: f64 = match sample_width {
        1 => raw
            .iter()
            .map(|&b| {
                let centred = b as f64 - 128.0;
                centred * centred
            })
            .sum(),
        2 => raw
            .chunks_exact(2)
            .map(|c| {
                let v = i16::from_le_bytes([c[0], c[1]]) as f64;
                v * v
            })
            .sum(),
        4 => raw
            .chunks_exact(4)
            .map(|c| {
                let v = i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64;
                v * v
            })
            .sum(),
        _ => unreachable!("sample_width validated above"),
    };

    let sample_count = window_bytes / sample_width as u64;
    if sample_count == 0 {
        return 0.0;
    }
    (sum_sq / sample_count as f64).sqrt()
}

/// Extract the raw byte slice `[start_byte, end_byte)` from a file, clamping
/// `end_byte` to the file size.
///
/// Fails with [`AgentError::InvalidRange`] if `start_byte >= file_size` or
/// `start_byte >= end_byte`.
pub fn extract_range(path: &Path, start_byte: u64, end_byte: u64) -> AgentResult<Vec<u8>> {
    let file_size = fs::metadata(path)
        .map_err(|e| AgentError::FileNotFound(format!("{}: {}", path.display(), e)))?
        .len();

    if start_byte >= file_size {
        return Err(AgentError::InvalidRange(format!(
            "start_byte {} >= file_size {}",
            start_byte, file_size
        )));
    }
    if start_byte >= end_byte {
        return Err(AgentError::InvalidRange(format!(
            "start_byte {} >= end_byte {}",
            start_byte, end_byte
        )));
    }

    let clamped_end = end_byte.min(file_size);
    let len = (clamped_end - start_byte) as usize;

    let mut file = fs::File::open(path)
        .map_err(|e| AgentError::FileNotFound(format!("{}: {}", path.display(), e)))?;
    file.seek(SeekFrom::Start(start_byte))
        .map_err(|e| AgentError::InvalidRange(e.to_string()))?;

    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .map_err(|e| AgentError::InvalidRange(e.to_string()))?;
    Ok(buf)
}
