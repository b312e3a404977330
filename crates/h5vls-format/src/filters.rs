//! Chunk filters: deflate, shuffle and fletcher32.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::FormatError;
use crate::filter_pipeline::{FilterPipeline, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE};

/// Undo the pipeline on a stored chunk. Filters run in reverse order and
/// any filter whose bit is set in `filter_mask` is skipped.
pub fn decode_chunk(
    stored: &[u8],
    pipeline: &FilterPipeline,
    filter_mask: u32,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = stored.to_vec();
    for (i, filter) in pipeline.filters.iter().enumerate().rev() {
        if i < 32 && filter_mask & (1 << i) != 0 {
            continue;
        }
        data = match filter.id {
            FILTER_DEFLATE => inflate(&data)?,
            FILTER_SHUFFLE => unshuffle(&data, element_size),
            FILTER_FLETCHER32 => fletcher32_strip(&data)?,
            other => return Err(FormatError::UnsupportedFilter(other)),
        };
    }
    Ok(data)
}

/// Apply the pipeline to a raw chunk.
pub fn encode_chunk(
    raw: &[u8],
    pipeline: &FilterPipeline,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = raw.to_vec();
    for filter in &pipeline.filters {
        data = match filter.id {
            FILTER_DEFLATE => {
                let level = filter.client_data.first().copied().unwrap_or(6).min(9);
                deflate(&data, level)?
            }
            FILTER_SHUFFLE => shuffle(&data, element_size),
            FILTER_FLETCHER32 => {
                let sum = fletcher32(&data);
                data.extend_from_slice(&sum.to_le_bytes());
                data
            }
            other => return Err(FormatError::UnsupportedFilter(other)),
        };
    }
    Ok(data)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(data.len() * 4);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| FormatError::FilterFailed {
            filter: FILTER_DEFLATE,
            message: e.to_string(),
        })?;
    Ok(out)
}

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>, FormatError> {
    let fail = |e: std::io::Error| FormatError::FilterFailed {
        filter: FILTER_DEFLATE,
        message: e.to_string(),
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).map_err(fail)?;
    encoder.finish().map_err(fail)
}

/// Byte-transpose so that byte `j` of every element is grouped together.
/// A trailing partial element is left in place.
fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let body = n * element_size;
    let mut out = vec![0u8; data.len()];
    for (i, elem) in data[..body].chunks_exact(element_size).enumerate() {
        for (j, &b) in elem.iter().enumerate() {
            out[j * n + i] = b;
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let body = n * element_size;
    let mut out = vec![0u8; data.len()];
    for (i, elem) in out[..body].chunks_exact_mut(element_size).enumerate() {
        for (j, b) in elem.iter_mut().enumerate() {
            *b = data[j * n + i];
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

/// Fletcher-32 over big-endian 16-bit words; an odd final byte is the
/// high half of a last word.
fn fletcher32(data: &[u8]) -> u32 {
    let (mut sum1, mut sum2) = (0u64, 0u64);
    for block in data.chunks(720) {
        for word in block.chunks(2) {
            let hi = word[0] as u64;
            let lo = word.get(1).copied().unwrap_or(0) as u64;
            sum1 += (hi << 8) | lo;
            sum2 += sum1;
        }
        sum1 %= 65535;
        sum2 %= 65535;
    }
    ((sum2 as u32) << 16) | sum1 as u32
}

fn fletcher32_strip(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let fail = |message: String| FormatError::FilterFailed {
        filter: FILTER_FLETCHER32,
        message,
    };
    let split = data
        .len()
        .checked_sub(4)
        .ok_or_else(|| fail("chunk shorter than its checksum".into()))?;
    let (payload, tail) = data.split_at(split);
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = fletcher32(payload);
    if stored != computed {
        return Err(fail(format!(
            "checksum {stored:#010x} does not match computed {computed:#010x}"
        )));
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_pipeline::Filter;

    fn sample(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn shuffle_layout() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(shuffle(&data, 4), vec![1, 5, 2, 6, 3, 7, 4, 8, 9]);
        assert_eq!(unshuffle(&shuffle(&data, 4), 4), data.to_vec());
    }

    #[test]
    fn full_pipeline_roundtrip() {
        let pipeline = FilterPipeline {
            filters: vec![Filter::shuffle(), Filter::deflate(9), Filter::fletcher32()],
        };
        let raw = sample(4000);
        let stored = encode_chunk(&raw, &pipeline, 8).unwrap();
        assert_ne!(stored, raw);
        assert_eq!(decode_chunk(&stored, &pipeline, 0, 8).unwrap(), raw);
    }

    #[test]
    fn deflate_compresses_repetitive_data() {
        let pipeline = FilterPipeline {
            filters: vec![Filter::deflate(6)],
        };
        let raw = vec![0u8; 10_000];
        let stored = encode_chunk(&raw, &pipeline, 1).unwrap();
        assert!(stored.len() < 200);
        assert_eq!(decode_chunk(&stored, &pipeline, 0, 1).unwrap(), raw);
    }

    #[test]
    fn masked_filters_are_skipped() {
        let pipeline = FilterPipeline {
            filters: vec![Filter::deflate(6)],
        };
        let raw = sample(64);
        assert_eq!(decode_chunk(&raw, &pipeline, 0b1, 1).unwrap(), raw);
    }

    #[test]
    fn fletcher32_detects_corruption() {
        let pipeline = FilterPipeline {
            filters: vec![Filter::fletcher32()],
        };
        let mut stored = encode_chunk(&sample(101), &pipeline, 1).unwrap();
        stored[10] ^= 0x40;
        assert!(matches!(
            decode_chunk(&stored, &pipeline, 0, 1),
            Err(FormatError::FilterFailed { filter: FILTER_FLETCHER32, .. })
        ));
    }

    #[test]
    fn corrupt_deflate_stream() {
        let pipeline = FilterPipeline {
            filters: vec![Filter::deflate(6)],
        };
        assert!(decode_chunk(&[1, 2, 3, 4], &pipeline, 0, 1).is_err());
    }

    #[test]
    fn unknown_filter() {
        let pipeline = FilterPipeline {
            filters: vec![Filter {
                id: 307,
                name: None,
                flags: 0,
                client_data: vec![],
            }],
        };
        assert_eq!(
            decode_chunk(&[0], &pipeline, 0, 1),
            Err(FormatError::UnsupportedFilter(307))
        );
    }
}
