//! Raw-deflate helpers shared by the index loader and node unpacking.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::DeflateDecoder;

use crate::error::{Result, VolumeError};

/// Magic of the 8-byte mini-header fronting deflated index and node data.
/// The mini-header is little-endian for every dialect.
pub const Z_MAGIC: u32 = 0xFFF7_EEC5;

/// Inflate a raw deflate stream (no zlib wrapper), appending to `out`.
pub fn inflate(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let mut decoder = DeflateDecoder::new(data);
    decoder
        .read_to_end(out)
        .map_err(|e| VolumeError::DecompressionFailed(format!("inflate: {e}")))?;
    Ok(())
}

/// Probe `data` for the deflate mini-header and replace the buffer with the
/// inflated payload when it matches. Returns whether inflation happened; a
/// buffer without the header is left untouched.
///
/// The header carries the magic and the two's complement of the expected
/// output size, which must agree with `out_size` modulo 2^32.
pub fn inflate_if_needed(data: &mut Vec<u8>, out_size: u64) -> Result<bool> {
    if out_size > u64::from(u32::MAX) || data.len() < 8 {
        return Ok(false);
    }

    let magic = LittleEndian::read_u32(&data[0..4]);
    let size_complement = LittleEndian::read_u32(&data[4..8]);
    if magic != Z_MAGIC || (out_size as u32).wrapping_add(size_complement) != 0 {
        return Ok(false);
    }

    let mut out = Vec::with_capacity(out_size as usize);
    inflate(&mut out, &data[8..])?;
    if out.len() as u64 != out_size {
        return Err(VolumeError::DecompressionFailed(format!(
            "inflated size mismatch: expected {out_size}, got {}",
            out.len()
        )));
    }
    *data = out;
    Ok(true)
}
