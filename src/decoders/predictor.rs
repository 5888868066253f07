//! PNG predictor decoding for cross-reference streams.
//!
//! Xref streams are commonly written with `/DecodeParms << /Predictor 12
//! /Columns w >>`. Each encoded row is one filter-tag byte followed by
//! `columns` data bytes; decoding reverses the per-row filter against the
//! previous decoded row, which starts as all zeros.

use crate::error::{Error, Result};

/// Reverse a PNG predictor (10-15) applied on top of Flate.
///
/// Predictor values 1 and below mean no prediction and return the input
/// unchanged. The per-row filter tag selects the actual algorithm, so all
/// PNG predictor values decode identically.
pub fn decode_predictor(data: &[u8], predictor: i64, columns: usize) -> Result<Vec<u8>> {
    match predictor {
        ..=1 => Ok(data.to_vec()),
        10..=15 => decode_png(data, columns),
        other => Err(Error::CorruptStream(format!("unsupported predictor {}", other))),
    }
}

fn decode_png(data: &[u8], columns: usize) -> Result<Vec<u8>> {
    if columns == 0 {
        return Err(Error::CorruptStream("predictor with zero columns".to_string()));
    }
    let row_len = columns + 1;
    if data.len() % row_len != 0 {
        return Err(Error::CorruptStream(format!(
            "predictor data length {} is not a multiple of row size {}",
            data.len(),
            row_len
        )));
    }

    let mut output = Vec::with_capacity(data.len() / row_len * columns);
    let mut prev = vec![0u8; columns];

    for row in data.chunks_exact(row_len) {
        let tag = row[0];
        let encoded = &row[1..];
        let mut decoded = vec![0u8; columns];
        for i in 0..columns {
            let left = if i > 0 { decoded[i - 1] } else { 0 };
            let up = prev[i];
            let up_left = if i > 0 { prev[i - 1] } else { 0 };
            decoded[i] = match tag {
                0 => encoded[i],
                1 => encoded[i].wrapping_add(left),
                2 => encoded[i].wrapping_add(up),
                3 => encoded[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => encoded[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::CorruptStream(format!(
                        "invalid PNG filter tag {}",
                        other
                    )))
                },
            };
        }
        output.extend_from_slice(&decoded);
        prev = decoded;
    }

    Ok(output)
}

/// Paeth filter function from the PNG specification. Ties break toward
/// `a`, then `b`.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_predictor() {
        let data = b"raw bytes";
        assert_eq!(decode_predictor(data, 1, 4).unwrap(), data);
    }

    #[test]
    fn test_filter_none() {
        let encoded = [0, 10, 20, 30];
        assert_eq!(decode_png(&encoded, 3).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_filter_sub() {
        // each byte is the difference from its left neighbor
        let encoded = [1, 10, 5, 5];
        assert_eq!(decode_png(&encoded, 3).unwrap(), vec![10, 15, 20]);
    }

    #[test]
    fn test_filter_up() {
        let encoded = [
            2, 10, 20, 30, 40, 50, // first row: up is all zeros
            2, 5, 5, 5, 5, 5, // second row adds 5 to the row above
        ];
        assert_eq!(
            decode_png(&encoded, 5).unwrap(),
            vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]
        );
    }

    #[test]
    fn test_filter_average() {
        let encoded = [
            3, 10, 10, // row 0: left/up averages from zero
            3, 10, 10,
        ];
        let out = decode_png(&encoded, 2).unwrap();
        assert_eq!(out[0], 10);
        assert_eq!(out[1], 15);
        assert_eq!(out[2], 15); // (0 + 10) / 2 + 10
        assert_eq!(out[3], 25); // (15 + 15) / 2 + 10
    }

    #[test]
    fn test_filter_paeth_first_row() {
        // first row: up and up-left are zero, so Paeth degenerates to left
        let encoded = [4, 8, 4, 4];
        assert_eq!(decode_png(&encoded, 3).unwrap(), vec![8, 12, 16]);
    }

    #[test]
    fn test_paeth_tie_breaks() {
        assert_eq!(paeth(3, 3, 3), 3);
        assert_eq!(paeth(1, 2, 0), 1); // pa == pb, prefer a
    }

    #[test]
    fn test_bad_row_size() {
        let result = decode_png(&[0, 1, 2], 3);
        assert!(matches!(result, Err(Error::CorruptStream(_))));
    }
}
