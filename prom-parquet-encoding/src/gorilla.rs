//! XOR (Gorilla-style) float encoding, registration id 99 in the original
//! `segmentio/parquet-go` fork this engine's on-disk format descends from.
//!
//! Facebook's Gorilla paper compresses a float64 stream by XORing each value
//! against its predecessor and bit-packing the result: an all-zero XOR costs
//! one bit, and a nonzero XOR costs a control bit plus, when the run of
//! leading/trailing zero bits changes, 11 bits of bookkeeping plus the
//! meaningful bits themselves. We drop the paired delta-of-delta timestamp
//! column from the original (the source's `gorilla.Compressor` pairs a
//! timestamp with each value, but `XorEncoding` always passes a dummy `1`)
//! since this engine operates on bare `&[f64]` vectors.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use prom_parquet_core::errors::{Error, Result};

use crate::bit_io::{BitReader, BitWriter};

/// Reserved for future use (e.g. a version tag); mirrors the 32-bit header
/// the original always writes as zero.
const HEADER: u32 = 0;

pub struct GorillaEncoder;

impl GorillaEncoder {
    pub fn encode(values: &[f64]) -> Bytes {
        let mut out = BytesMut::new().writer();
        out.write_u32::<LittleEndian>(HEADER).unwrap();
        out.write_u32::<LittleEndian>(values.len() as u32).unwrap();

        let mut w = BitWriter::with_capacity_bits(values.len() * 64);
        let mut prev_leading: Option<u32> = None;
        let mut prev_trailing: Option<u32> = None;
        let mut prev_bits = 0u64;

        for (i, &v) in values.iter().enumerate() {
            let bits = v.to_bits();
            if i == 0 {
                w.write_bits(bits, 64);
                prev_bits = bits;
                continue;
            }
            let xor = bits ^ prev_bits;
            prev_bits = bits;
            if xor == 0 {
                w.write_bit(false);
                continue;
            }
            w.write_bit(true);
            let leading = xor.leading_zeros();
            let trailing = xor.trailing_zeros();
            match (prev_leading, prev_trailing) {
                (Some(pl), Some(pt)) if leading >= pl && trailing >= pt => {
                    w.write_bit(false);
                    let len = 64 - pl - pt;
                    w.write_bits(xor >> pt, len);
                }
                _ => {
                    w.write_bit(true);
                    // Cap leading at 31 so it fits 5 bits, as the Gorilla paper does.
                    let leading = leading.min(31);
                    let meaningful = 64 - leading - trailing;
                    w.write_bits(leading as u64, 5);
                    // meaningful is in 1..=64; store meaningful-1 in 6 bits.
                    w.write_bits((meaningful - 1) as u64, 6);
                    w.write_bits(xor >> trailing, meaningful);
                    prev_leading = Some(leading);
                    prev_trailing = Some(trailing);
                }
            }
        }
        let mut out = out.into_inner();
        out.extend_from_slice(&w.into_bytes());
        let encoded = out.freeze();
        log::debug!("gorilla encode: {} values -> {} bytes", values.len(), encoded.len());
        encoded
    }
}

pub struct GorillaDecoder;

impl GorillaDecoder {
    pub fn decode(src: &[u8]) -> Result<Vec<f64>> {
        if src.len() < 8 {
            return Err(Error::Corrupt("xor stream shorter than header".into()));
        }
        let mut header_bytes = &src[0..8];
        let _header = header_bytes.read_u32::<LittleEndian>().unwrap();
        let count = header_bytes.read_u32::<LittleEndian>().unwrap() as usize;
        log::debug!("gorilla decode: {count} values from {} bytes", src.len());
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut r = BitReader::new(&src[8..]);
        let mut values = Vec::with_capacity(count);
        let first = r
            .read_bits(64)
            .ok_or_else(|| Error::Corrupt("xor stream truncated before first value".into()))?;
        values.push(f64::from_bits(first));
        let mut prev_bits = first;
        let mut prev_leading = 0u32;
        let mut prev_trailing = 0u32;

        for _ in 1..count {
            let control = r
                .read_bit()
                .ok_or_else(|| Error::Corrupt("xor stream truncated".into()))?;
            if !control {
                values.push(f64::from_bits(prev_bits));
                continue;
            }
            let new_window = r
                .read_bit()
                .ok_or_else(|| Error::Corrupt("xor stream truncated".into()))?;
            if new_window {
                let leading = r
                    .read_bits(5)
                    .ok_or_else(|| Error::Corrupt("xor stream truncated".into()))? as u32;
                let meaningful = r
                    .read_bits(6)
                    .ok_or_else(|| Error::Corrupt("xor stream truncated".into()))?
                    as u32
                    + 1;
                let trailing = 64 - leading - meaningful;
                let bits = r
                    .read_bits(meaningful)
                    .ok_or_else(|| Error::Corrupt("xor stream truncated".into()))?;
                let xor = bits << trailing;
                prev_leading = leading;
                prev_trailing = trailing;
                prev_bits ^= xor;
            } else {
                let len = 64 - prev_leading - prev_trailing;
                let bits = r
                    .read_bits(len)
                    .ok_or_else(|| Error::Corrupt("xor stream truncated".into()))?;
                let xor = bits << prev_trailing;
                prev_bits ^= xor;
            }
            values.push(f64::from_bits(prev_bits));
        }
        Ok(values)
    }
}

/// Which codec a float value column uses. Carried in the per-file config
/// consulted by the scanner/projection rather than read from the Parquet
/// page header's encoding byte, since arrow-rs has no pluggable encoding
/// registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FloatColumnCodec {
    #[default]
    Plain,
    Xor,
}
