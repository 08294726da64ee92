//! Raw sample-buffer layouts.
//!
//! Files carry no header; the layout and capture kind come from the caller.
//! All fields are little-endian.
//!
//! * `sparsev1` analog: `{ i64 offset, i64 duration, f32 value }` per sample
//! * `sparsev1` digital: `{ i64 offset, i64 duration, u8 level }` per sample
//! * `densev1`: bare `f32` or `u8` values, timing implied by position
//!
//! Density fields (eye, waterfall) are bare `f32` grids.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::capture::{CaptureError, DensityField, SampleSeries};

/// Samples written between progress callbacks.
pub const WRITE_BLOCK: usize = 10_000;

const SPARSE_ANALOG_RECORD: usize = 20;
const SPARSE_DIGITAL_RECORD: usize = 17;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{len} bytes is not a whole number of {record}-byte records")]
    Truncated { len: usize, record: usize },
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    SparseV1,
    DenseV1,
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::SparseV1 => "sparsev1",
            SampleFormat::DenseV1 => "densev1",
        }
    }
}

/// File name for one stream of one channel: stream 0 keeps the bare name.
pub fn stream_file_name(channel_index: u32, stream: u32) -> String {
    if stream == 0 {
        format!("channel_{channel_index}.bin")
    } else {
        format!("channel_{channel_index}_stream{stream}.bin")
    }
}

fn le_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(raw)
}

fn le_f32(bytes: &[u8]) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    f32::from_le_bytes(raw)
}

fn read_records(mut reader: impl Read, record: usize) -> Result<Vec<u8>, FormatError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % record != 0 {
        return Err(FormatError::Truncated {
            len: bytes.len(),
            record,
        });
    }
    Ok(bytes)
}

fn read_series<T>(
    reader: impl Read,
    format: SampleFormat,
    width: usize,
    decode: impl Fn(&[u8]) -> T,
) -> Result<SampleSeries<T>, FormatError> {
    match format {
        SampleFormat::DenseV1 => {
            let bytes = read_records(reader, width)?;
            Ok(SampleSeries::dense(
                bytes.chunks_exact(width).map(decode).collect(),
            ))
        }
        SampleFormat::SparseV1 => {
            let record = 16 + width;
            let bytes = read_records(reader, record)?;
            let count = bytes.len() / record;
            let mut offsets = Vec::with_capacity(count);
            let mut durations = Vec::with_capacity(count);
            let mut values = Vec::with_capacity(count);
            for chunk in bytes.chunks_exact(record) {
                offsets.push(le_i64(&chunk[0..8]));
                durations.push(le_i64(&chunk[8..16]));
                values.push(decode(&chunk[16..]));
            }
            Ok(SampleSeries::sparse(offsets, durations, values)?)
        }
    }
}

pub fn read_analog(reader: impl Read, format: SampleFormat) -> Result<SampleSeries<f32>, FormatError> {
    read_series(reader, format, SPARSE_ANALOG_RECORD - 16, le_f32)
}

pub fn read_digital(
    reader: impl Read,
    format: SampleFormat,
) -> Result<SampleSeries<bool>, FormatError> {
    read_series(reader, format, SPARSE_DIGITAL_RECORD - 16, |b| b[0] != 0)
}

pub fn read_density(reader: impl Read, width: u32, height: u32) -> Result<DensityField, FormatError> {
    let bytes = read_records(reader, 4)?;
    let data = bytes.chunks_exact(4).map(le_f32).collect();
    Ok(DensityField::new(width, height, data)?)
}

fn write_series<T, W: Write>(
    mut writer: W,
    series: &SampleSeries<T>,
    format: SampleFormat,
    encode: impl Fn(&T, &mut Vec<u8>),
    mut progress: impl FnMut(f32),
) -> Result<(), FormatError> {
    let total = series.len();
    let mut block = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + WRITE_BLOCK).min(total);
        block.clear();
        for index in start..end {
            if format == SampleFormat::SparseV1 {
                block.extend_from_slice(&series.offset(index).to_le_bytes());
                block.extend_from_slice(&series.duration(index).to_le_bytes());
            }
            encode(series.value(index), &mut block);
        }
        writer.write_all(&block)?;
        progress(end as f32 / total as f32);
        start = end;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_analog<W: Write>(
    writer: W,
    series: &SampleSeries<f32>,
    format: SampleFormat,
    progress: impl FnMut(f32),
) -> Result<(), FormatError> {
    write_series(
        writer,
        series,
        format,
        |v, out| out.extend_from_slice(&v.to_le_bytes()),
        progress,
    )
}

pub fn write_digital<W: Write>(
    writer: W,
    series: &SampleSeries<bool>,
    format: SampleFormat,
    progress: impl FnMut(f32),
) -> Result<(), FormatError> {
    write_series(writer, series, format, |v, out| out.push(u8::from(*v)), progress)
}

pub fn load_analog(path: &Path, format: SampleFormat) -> Result<SampleSeries<f32>, FormatError> {
    let series = read_analog(BufReader::new(File::open(path)?), format)?;
    debug!(path = %path.display(), format = format.as_str(), samples = series.len(), "loaded analog samples");
    Ok(series)
}

pub fn load_digital(path: &Path, format: SampleFormat) -> Result<SampleSeries<bool>, FormatError> {
    let series = read_digital(BufReader::new(File::open(path)?), format)?;
    debug!(path = %path.display(), format = format.as_str(), samples = series.len(), "loaded digital samples");
    Ok(series)
}

pub fn load_density(path: &Path, width: u32, height: u32) -> Result<DensityField, FormatError> {
    read_density(BufReader::new(File::open(path)?), width, height)
}

pub fn save_analog(
    path: &Path,
    series: &SampleSeries<f32>,
    format: SampleFormat,
) -> Result<(), FormatError> {
    write_analog(BufWriter::new(File::create(path)?), series, format, |_| {})
}

pub fn save_digital(
    path: &Path,
    series: &SampleSeries<bool>,
    format: SampleFormat,
) -> Result<(), FormatError> {
    write_digital(BufWriter::new(File::create(path)?), series, format, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_streams() {
        assert_eq!(stream_file_name(3, 0), "channel_3.bin");
        assert_eq!(stream_file_name(3, 2), "channel_3_stream2.bin");
    }

    #[test]
    fn sparse_analog_record_layout() {
        let series = SampleSeries::sparse(vec![-5], vec![7], vec![1.5f32]).unwrap();
        let mut bytes = Vec::new();
        write_analog(&mut bytes, &series, SampleFormat::SparseV1, |_| {}).unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..8], &(-5i64).to_le_bytes());
        assert_eq!(&bytes[8..16], &7i64.to_le_bytes());
        assert_eq!(&bytes[16..20], &1.5f32.to_le_bytes());
    }

    #[test]
    fn dense_digital_drops_timing() {
        let series =
            SampleSeries::sparse(vec![0, 40], vec![40, 10], vec![true, false]).unwrap();
        let mut bytes = Vec::new();
        write_digital(&mut bytes, &series, SampleFormat::DenseV1, |_| {}).unwrap();
        assert_eq!(bytes, vec![1, 0]);

        let back = read_digital(bytes.as_slice(), SampleFormat::DenseV1).unwrap();
        assert!(back.is_dense());
        assert_eq!(back.values(), &[true, false]);
        assert_eq!(back.offset(1), 1);
    }

    #[test]
    fn rejects_partial_records() {
        let bytes = vec![0u8; 25];
        let err = read_analog(bytes.as_slice(), SampleFormat::SparseV1).unwrap_err();
        assert!(matches!(err, FormatError::Truncated { len: 25, record: 20 }));
    }

    #[test]
    fn rejects_unordered_sparse_file() {
        let mut bytes = Vec::new();
        for offset in [10i64, 5] {
            bytes.extend_from_slice(&offset.to_le_bytes());
            bytes.extend_from_slice(&1i64.to_le_bytes());
            bytes.push(1);
        }
        let err = read_digital(bytes.as_slice(), SampleFormat::SparseV1).unwrap_err();
        assert!(matches!(err, FormatError::Capture(CaptureError::Unordered { index: 1 })));
    }

    #[test]
    fn reports_progress_per_block() {
        let series = SampleSeries::dense(vec![0.0f32; WRITE_BLOCK * 2 + 5]);
        let mut calls = Vec::new();
        write_analog(io::sink(), &series, SampleFormat::DenseV1, |p| calls.push(p)).unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.last().copied(), Some(1.0));
    }

    #[test]
    fn saves_and_loads_sparse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(stream_file_name(0, 0));
        let series =
            SampleSeries::sparse(vec![0, 10, 30], vec![10, 20, 5], vec![0.1f32, -0.2, 0.3])
                .unwrap();
        save_analog(&path, &series, SampleFormat::SparseV1).unwrap();
        let loaded = load_analog(&path, SampleFormat::SparseV1).unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn reads_density_grid() {
        let mut bytes = Vec::new();
        for v in [0.0f32, 0.5, 1.0, 0.25, 0.0, 2.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let field = read_density(bytes.as_slice(), 3, 2).unwrap();
        assert_eq!(field.peak(), 2.0);
        assert!(read_density(bytes.as_slice(), 4, 2).is_err());
    }
}
