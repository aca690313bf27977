//! The segmented "expand" container layered on top of node bodies.
//!
//! An expanded file starts with a 32-byte super-header followed by
//! fixed-size segments, each fronted by a 16-byte segment header whose
//! `zsize` bytes of raw deflate reconstruct a slice of the original file.
//! Segment 0 starts right after the super-header; segment `i` starts at
//! `i * segment_size`. Both header layouts are little-endian for every
//! dialect.

use byteorder::{ByteOrder, LittleEndian};

use crate::bits;
use crate::compress;
use crate::error::{Result, VolumeError};

pub const EXPAND_MAGIC: u32 = 0xFFF7_F32F;
pub const ALIGNMENT: u32 = 0x400;
pub const SUPER_HEADER_SIZE: usize = 32;
pub const SEGMENT_HEADER_SIZE: usize = 16;

/// Super-header fronting an expanded file.
#[derive(Debug, Clone)]
pub struct SuperHeader {
    pub magic: u32,
    pub decompressed_file_size: u32,
    pub file_size: u32,
    pub segment_size: u32,
    pub flags: u32,
}

impl SuperHeader {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SUPER_HEADER_SIZE {
            return None;
        }
        Some(SuperHeader {
            magic: LittleEndian::read_u32(&data[0..4]),
            decompressed_file_size: LittleEndian::read_u32(&data[4..8]),
            file_size: LittleEndian::read_u32(&data[8..12]),
            segment_size: LittleEndian::read_u32(&data[12..16]),
            flags: LittleEndian::read_u32(&data[16..20]),
            // 12 reserved bytes close the header
        })
    }
}

/// Per-segment header. The checksum is carried on disk but not verified.
#[derive(Debug, Clone)]
struct SegmentHeader {
    zsize: u32,
}

impl SegmentHeader {
    fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let header = bits::bytes_at(data, offset, SEGMENT_HEADER_SIZE)?;
        Ok(SegmentHeader {
            zsize: LittleEndian::read_u32(&header[8..12]),
        })
    }
}

fn parse_checked(data: &[u8]) -> Option<SuperHeader> {
    let header = SuperHeader::parse(data)?;
    let valid = header.magic == EXPAND_MAGIC
        && header.segment_size != 0
        && header.segment_size % ALIGNMENT == 0
        && data.len() as u64 >= u64::from(header.file_size);
    valid.then_some(header)
}

/// Whether `data` looks like a well-formed expanded file.
pub fn is_expanded(data: &[u8]) -> bool {
    parse_checked(data).is_some()
}

/// Reassemble the original file from an expanded buffer.
pub fn unexpand(data: &[u8]) -> Result<Vec<u8>> {
    let header = parse_checked(data).ok_or_else(|| {
        VolumeError::DecompressionFailed("not an expanded stream".to_string())
    })?;

    let segment_size = header.segment_size as usize;
    let segment_count = (u64::from(header.file_size) + u64::from(header.segment_size) - 1)
        / u64::from(header.segment_size);

    let mut out = Vec::with_capacity(header.decompressed_file_size as usize);
    for i in 0..segment_count as usize {
        let header_offset = if i == 0 {
            SUPER_HEADER_SIZE
        } else {
            segment_size * i
        };
        let segment = SegmentHeader::parse(data, header_offset)?;
        let zdata = bits::bytes_at(
            data,
            header_offset + SEGMENT_HEADER_SIZE,
            segment.zsize as usize,
        )?;
        compress::inflate(&mut out, zdata)?;
    }

    if out.len() != header.decompressed_file_size as usize {
        return Err(VolumeError::DecompressionFailed(format!(
            "expanded size mismatch: expected {}, got {}",
            header.decompressed_file_size,
            out.len()
        )));
    }
    Ok(out)
}
