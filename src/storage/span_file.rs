//! Binary span file codec.
//!
//! A span file is a sequence of fixed-size records: two non-negative
//! little-endian 64-bit integers for the start and end offsets, followed by
//! two little-endian 32-bit values for the fractional nesting order
//! (numerator, denominator). The record count equals the span count.
//! Readers validate record size, denominators and monotonicity.

use crate::base::{Fraction, Result, Span, SparvError, check_monotone};

const RECORD_SIZE: usize = 8 + 8 + 4 + 4;

pub fn encode(spans: &[Span]) -> Vec<u8> {
    let mut out = Vec::with_capacity(spans.len() * RECORD_SIZE);
    for span in spans {
        out.extend_from_slice(&span.start().to_le_bytes());
        out.extend_from_slice(&span.end().to_le_bytes());
        out.extend_from_slice(&span.nest().num().to_le_bytes());
        out.extend_from_slice(&span.nest().den().to_le_bytes());
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<Vec<Span>> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(SparvError::Corrupt(format!(
            "span file length {} is not a multiple of the record size",
            bytes.len()
        )));
    }
    let mut spans = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    for record in bytes.chunks_exact(RECORD_SIZE) {
        let start = u64::from_le_bytes(record[0..8].try_into().expect("record size"));
        let end = u64::from_le_bytes(record[8..16].try_into().expect("record size"));
        let num = u32::from_le_bytes(record[16..20].try_into().expect("record size"));
        let den = u32::from_le_bytes(record[20..24].try_into().expect("record size"));
        spans.push(Span::with_nesting(start, end, Fraction::new(num, den)?)?);
    }
    check_monotone(&spans)?;
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let spans = vec![
            Span::with_nesting(0, 42, Fraction::for_depth(0)).unwrap(),
            Span::with_nesting(0, 42, Fraction::for_depth(1)).unwrap(),
            Span::new(7, 12).unwrap(),
            Span::new(13, 13).unwrap(),
        ];
        let decoded = decode(&encode(&spans)).unwrap();
        assert_eq!(decoded, spans);
    }

    #[test]
    fn test_empty_file_is_zero_spans() {
        assert_eq!(decode(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = encode(&[Span::new(0, 5).unwrap()]);
        assert!(decode(&bytes[..RECORD_SIZE - 3]).is_err());
    }

    #[test]
    fn test_non_monotone_rejected() {
        let spans = [Span::new(10, 20).unwrap(), Span::new(0, 5).unwrap()];
        let mut bytes = Vec::new();
        for s in &spans {
            bytes.extend_from_slice(&s.start().to_le_bytes());
            bytes.extend_from_slice(&s.end().to_le_bytes());
            bytes.extend_from_slice(&s.nest().num().to_le_bytes());
            bytes.extend_from_slice(&s.nest().den().to_le_bytes());
        }
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_inverted_span_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9u64.to_le_bytes());
        bytes.extend_from_slice(&3u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        assert!(decode(&bytes).is_err());
    }
}
