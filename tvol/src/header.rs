//! Archive dialects, header layouts, and on-disk constants.
//!
//! Three generations share the container: T5 and T6 differ only in cipher
//! material and are big-endian on wire; T7 is little-endian, spreads node
//! payloads over sibling data files, and tweaks its header with an extra
//! XOR. Tree-internal data is big-endian for all of them; only the layouts
//! parsed here follow the dialect byte order.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{Result, VolumeError};
use crate::keyset::Keyset;

/// Magic of the primary-file header, common to all dialects.
pub const HEADER_MAGIC: u32 = 0x5B74_5162;

/// Magic of the tree-root directory at the start of the index blob.
pub const SEGMENT_MAGIC: u32 = 0x5B74_516E;

/// Alignment unit of the primary file; the index blob starts at this
/// offset.
pub const SEGMENT_SIZE: u64 = 0x800;

/// Magic of the extended header fronting each T7 data file.
pub const EXT_HEADER_MAGIC: u64 = 0x2B26_9585_23AD;
pub const EXT_HEADER_SIZE: usize = 32;
pub const EXT_ALIGNMENT: u32 = 0x400;

/// Geometry used when the archive has no extended headers (T5/T6).
pub const DEFAULT_SECTOR_SIZE: u32 = 0x800;
pub const DEFAULT_SEGMENT_SIZE: u32 = 0x1_0000;

/// T7 XORs this into the first header word after the block-cipher pass.
pub const T7_HEADER_TWEAK: u32 = 0x9AEF_DE67;

const VOLUME_NAME_LENGTH: usize = 16;
const VOLUME_INFO_SIZE: usize = VOLUME_NAME_LENGTH + 8;

static T5_KEYSET: Keyset = Keyset::new(
    "KALAHARI-37863889",
    [0x2DEE_26A7, 0x412D_99F5, 0x883C_94E9, 0x0F1A_7069],
);
static T6_KEYSET: Keyset = Keyset::new(
    "PISCINAS-323419048",
    [0xAA1B_6A59, 0xE70B_6FB3, 0x62DC_6095, 0x6A59_4A25],
);
static T7_KEYSET: Keyset = Keyset::new(
    "KYZYLKUM-873068469",
    [0xC9DA_80A5, 0x050D_A9A1, 0x9EB1_FE65, 0xB651_F2FB],
);

/// Archive generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    T5,
    T6,
    T7,
}

impl Dialect {
    /// The order [`Volume::open`](crate::volume::Volume::open) probes in.
    pub const PROBE_ORDER: [Dialect; 3] = [Dialect::T5, Dialect::T6, Dialect::T7];

    pub fn keyset(self) -> &'static Keyset {
        match self {
            Dialect::T5 => &T5_KEYSET,
            Dialect::T6 => &T6_KEYSET,
            Dialect::T7 => &T7_KEYSET,
        }
    }

    pub fn header_size(self) -> usize {
        match self {
            Dialect::T5 | Dialect::T6 => 0xA0,
            Dialect::T7 => 0xA60,
        }
    }

    pub fn big_endian(self) -> bool {
        !matches!(self, Dialect::T7)
    }

    /// Path normalisation applied before index lookups. T7 stores its name
    /// table uppercased, so queries are uppercased byte-wise (ASCII only)
    /// and stripped of leading whitespace.
    pub fn normalize_path(self, path: &str) -> String {
        match self {
            Dialect::T7 => path
                .trim_start_matches(|c: char| c.is_ascii_whitespace())
                .to_ascii_uppercase(),
            _ => path.to_string(),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::T5 => write!(f, "T5"),
            Dialect::T6 => write!(f, "T6"),
            Dialect::T7 => write!(f, "T7"),
        }
    }
}

/// Parsed primary-file header, T5/T6 form (0xA0 bytes).
#[derive(Debug, Clone)]
pub struct ClassicHeader {
    pub seed: u32,
    /// Size of the deflated index blob, mini-header included.
    pub compressed_index_size: u32,
    pub index_size: u32,
    /// Eight opaque bytes the format carries between the sizes and the file
    /// size.
    pub reserved: u64,
    pub file_size: u64,
    /// NUL-padded title identifier.
    pub title_id: String,
}

/// Parsed primary-file header, T7 form (0xA60 bytes) listing the sibling
/// data files.
#[derive(Debug, Clone)]
pub struct MultiVolumeHeader {
    /// Sixteen opaque bytes following the magic.
    pub reserved: [u32; 4],
    pub seed: u32,
    pub compressed_index_size: u32,
    pub index_size: u32,
    pub volumes: Vec<VolumeInfo>,
}

/// One sibling data file named by a T7 header.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub file_name: String,
    pub file_size: u64,
}

#[derive(Debug, Clone)]
pub enum Header {
    Classic(ClassicHeader),
    MultiVolume(MultiVolumeHeader),
}

impl Header {
    pub fn parse(dialect: Dialect, bytes: &[u8]) -> Result<Header> {
        if bytes.len() < dialect.header_size() {
            return Err(VolumeError::Truncated(bytes.len()));
        }
        match dialect {
            Dialect::T5 | Dialect::T6 => parse_classic::<BigEndian>(bytes).map(Header::Classic),
            Dialect::T7 => parse_multi_volume::<LittleEndian>(bytes).map(Header::MultiVolume),
        }
    }

    pub fn seed(&self) -> u32 {
        match self {
            Header::Classic(h) => h.seed,
            Header::MultiVolume(h) => h.seed,
        }
    }

    pub fn compressed_index_size(&self) -> u32 {
        match self {
            Header::Classic(h) => h.compressed_index_size,
            Header::MultiVolume(h) => h.compressed_index_size,
        }
    }

    pub fn index_size(&self) -> u32 {
        match self {
            Header::Classic(h) => h.index_size,
            Header::MultiVolume(h) => h.index_size,
        }
    }
}

fn check_magic(what: &'static str, expected: u64, actual: u64) -> Result<()> {
    if actual != expected {
        return Err(VolumeError::BadMagic {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn parse_classic<E: ByteOrder>(bytes: &[u8]) -> Result<ClassicHeader> {
    let mut cursor = Cursor::new(bytes);

    let magic = cursor.read_u32::<E>()?;
    check_magic("header", u64::from(HEADER_MAGIC), u64::from(magic))?;

    let seed = cursor.read_u32::<E>()?;
    let compressed_index_size = cursor.read_u32::<E>()?;
    let index_size = cursor.read_u32::<E>()?;
    let reserved = cursor.read_u64::<E>()?;
    let file_size = cursor.read_u64::<E>()?;

    let mut title = [0u8; 128];
    cursor.read_exact(&mut title)?;

    Ok(ClassicHeader {
        seed,
        compressed_index_size,
        index_size,
        reserved,
        file_size,
        title_id: nul_terminated(&title),
    })
}

fn parse_multi_volume<E: ByteOrder>(bytes: &[u8]) -> Result<MultiVolumeHeader> {
    let mut cursor = Cursor::new(bytes);

    let magic = cursor.read_u32::<E>()?;
    check_magic("header", u64::from(HEADER_MAGIC), u64::from(magic))?;

    let mut reserved = [0u32; 4];
    for slot in &mut reserved {
        *slot = cursor.read_u32::<E>()?;
    }
    cursor.set_position(cursor.position() + 0xDC);

    let seed = cursor.read_u32::<E>()?;
    let compressed_index_size = cursor.read_u32::<E>()?;
    let index_size = cursor.read_u32::<E>()?;
    let volume_count = cursor.read_u32::<E>()? as usize;

    let roster_start = cursor.position() as usize;
    let roster_len = volume_count
        .checked_mul(VOLUME_INFO_SIZE)
        .ok_or(VolumeError::Truncated(roster_start))?;
    if roster_start + roster_len > bytes.len() {
        return Err(VolumeError::Truncated(bytes.len()));
    }

    let mut volumes = Vec::with_capacity(volume_count);
    for _ in 0..volume_count {
        let mut name = [0u8; VOLUME_NAME_LENGTH];
        cursor.read_exact(&mut name)?;
        let raw_size = cursor.read_u64::<E>()?;
        volumes.push(VolumeInfo {
            file_name: nul_terminated(&name),
            // The 32-bit halves are swapped on wire.
            file_size: raw_size.rotate_left(32),
        });
    }

    Ok(MultiVolumeHeader {
        reserved,
        seed,
        compressed_index_size,
        index_size,
        volumes,
    })
}

/// Extended header at the start of each T7 data file (little-endian).
#[derive(Debug, Clone)]
pub struct ExtHeader {
    /// Addressing unit of node payloads; multiple of [`EXT_ALIGNMENT`].
    pub sector_size: u32,
    pub segment_size: u32,
    pub file_size: u64,
    pub flags: u32,
    pub reserved: u32,
}

impl ExtHeader {
    pub fn parse(bytes: &[u8]) -> Result<ExtHeader> {
        if bytes.len() < EXT_HEADER_SIZE {
            return Err(VolumeError::Truncated(bytes.len()));
        }
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.read_u64::<LittleEndian>()?;
        check_magic("data file header", EXT_HEADER_MAGIC, magic)?;

        let sector_size = cursor.read_u32::<LittleEndian>()?;
        let segment_size = cursor.read_u32::<LittleEndian>()?;
        let file_size = cursor.read_u64::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let reserved = cursor.read_u32::<LittleEndian>()?;

        if sector_size == 0 || sector_size % EXT_ALIGNMENT != 0 {
            return Err(VolumeError::Corrupt(format!(
                "data file sector size 0x{sector_size:X} not a multiple of 0x{EXT_ALIGNMENT:X}"
            )));
        }
        if segment_size == 0 || segment_size % EXT_ALIGNMENT != 0 {
            return Err(VolumeError::Corrupt(format!(
                "data file segment size 0x{segment_size:X} not a multiple of 0x{EXT_ALIGNMENT:X}"
            )));
        }

        Ok(ExtHeader {
            sector_size,
            segment_size,
            file_size,
            flags,
            reserved,
        })
    }
}

/// Tree-root directory at the start of the decrypted index blob.
#[derive(Debug, Clone)]
pub struct SegmentHeader {
    pub name_tree_offset: u32,
    pub ext_tree_offset: u32,
    pub node_tree_offset: u32,
    pub entry_tree_offsets: Vec<u32>,
}

impl SegmentHeader {
    pub fn parse(dialect: Dialect, data: &[u8]) -> Result<SegmentHeader> {
        if dialect.big_endian() {
            Self::parse_endian::<BigEndian>(data)
        } else {
            Self::parse_endian::<LittleEndian>(data)
        }
    }

    fn parse_endian<E: ByteOrder>(data: &[u8]) -> Result<SegmentHeader> {
        if data.len() < 20 {
            return Err(VolumeError::Truncated(data.len()));
        }
        let mut cursor = Cursor::new(data);

        let magic = cursor.read_u32::<E>()?;
        check_magic("index segment", u64::from(SEGMENT_MAGIC), u64::from(magic))?;

        let name_tree_offset = cursor.read_u32::<E>()?;
        let ext_tree_offset = cursor.read_u32::<E>()?;
        let node_tree_offset = cursor.read_u32::<E>()?;
        let entry_tree_count = cursor.read_u32::<E>()? as usize;

        let offsets_start = cursor.position() as usize;
        let offsets_len = entry_tree_count
            .checked_mul(4)
            .ok_or(VolumeError::Truncated(offsets_start))?;
        if offsets_start + offsets_len > data.len() {
            return Err(VolumeError::Truncated(data.len()));
        }

        let mut entry_tree_offsets = Vec::with_capacity(entry_tree_count);
        for _ in 0..entry_tree_count {
            entry_tree_offsets.push(cursor.read_u32::<E>()?);
        }

        Ok(SegmentHeader {
            name_tree_offset,
            ext_tree_offset,
            node_tree_offset,
            entry_tree_offsets,
        })
    }
}
