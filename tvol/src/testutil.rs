//! Builders for synthetic trees, containers, and whole archives used by the
//! unit tests. Encoding lives here only; the shipped crate has no write
//! path.

use std::io::Read;

use flate2::read::DeflateEncoder;
use flate2::Compression;

use crate::compress::Z_MAGIC;
use crate::expand::{EXPAND_MAGIC, SUPER_HEADER_SIZE};
use crate::header::{
    Dialect, EXT_HEADER_MAGIC, HEADER_MAGIC, SEGMENT_MAGIC, SEGMENT_SIZE, T7_HEADER_TWEAK,
};
use crate::keyset;

// ── Primitive encoders ───────────────────────────────────────────────────

/// Encode `value` as the self-delimiting big-endian varint the index uses:
/// a unary length prefix in the first byte, then big-endian payload bytes.
pub fn varint_encode(value: u64) -> Vec<u8> {
    let bits = 64 - value.leading_zeros().min(63);
    let len = ((bits + 6) / 7).max(1) as usize;
    assert!(len <= 8, "value out of varint range: {value:#x}");

    let mut out = vec![0u8; len];
    let mut v = value;
    for slot in out.iter_mut().skip(1).rev() {
        *slot = (v & 0xFF) as u8;
        v >>= 8;
    }
    let prefix_bits = (len - 1) as u32;
    let prefix = if prefix_bits == 0 {
        0
    } else {
        (!0u8) << (8 - prefix_bits)
    };
    out[0] = prefix | (v as u8);
    out
}

/// Pack 12-bit fields most-significant-bit first, padding the final nibble
/// with zeros.
pub fn pack12(fields: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity((fields.len() * 12 + 7) / 8);
    let mut acc = 0u32;
    let mut bits = 0u32;
    for &field in fields {
        acc = (acc << 12) | u32::from(field & 0xFFF);
        bits += 12;
        while bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    if bits > 0 {
        out.push((acc << (8 - bits)) as u8);
    }
    out
}

// ── Tree builders ────────────────────────────────────────────────────────

/// Pack records into one node: field 0 is the record count, fields
/// `1..=count` are record offsets relative to the node, the final field is
/// the node's total size (the next-sibling offset).
pub fn leaf_node(records: &[Vec<u8>]) -> Vec<u8> {
    let field_count = records.len() + 2;
    let field_bytes = (field_count * 12 + 7) / 8;

    let mut offsets = Vec::with_capacity(records.len());
    let mut cursor = field_bytes;
    for record in records {
        offsets.push(cursor as u16);
        cursor += record.len();
    }

    let mut fields = Vec::with_capacity(field_count);
    fields.push(records.len() as u16);
    fields.extend_from_slice(&offsets);
    fields.push(cursor as u16);

    let mut out = pack12(&fields);
    for record in records {
        out.extend_from_slice(record);
    }
    out
}

/// A tree with no descent levels: the 6-byte preamble points straight at a
/// single leaf.
pub fn tree_depth0(records: &[Vec<u8>]) -> Vec<u8> {
    let leaf = leaf_node(records);
    let mut out = Vec::with_capacity(6 + leaf.len());
    out.push(0); // descent levels
    out.extend_from_slice(&[0, 0, 6]); // 24-bit offset of the top node
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&leaf);
    out
}

/// A string tree with one interior level. `separators[i]` must be a strict
/// upper bound for the keys of leaf `i` and no greater than the first key
/// of leaf `i + 1`.
pub fn string_tree_depth1(leaves: &[&[&str]], separators: &[&str]) -> Vec<u8> {
    assert_eq!(leaves.len(), separators.len());

    let leaf_nodes: Vec<Vec<u8>> = leaves
        .iter()
        .map(|words| {
            let records: Vec<Vec<u8>> =
                words.iter().map(|w| string_record(w.as_bytes())).collect();
            leaf_node(&records)
        })
        .collect();

    let mut offset = 6usize;
    let mut leaf_offsets = Vec::with_capacity(leaf_nodes.len());
    for leaf in &leaf_nodes {
        leaf_offsets.push(offset);
        offset += leaf.len();
    }
    let interior_offset = offset;

    // Interior records: subtree key-index bound, separator, child offset
    // (relative to the tree base).
    let mut cumulative = 0u64;
    let mut payloads = Vec::with_capacity(leaves.len());
    for ((words, separator), child) in leaves.iter().zip(separators).zip(&leaf_offsets) {
        cumulative += words.len() as u64;
        let mut payload = varint_encode(cumulative);
        payload.extend_from_slice(&string_record(separator.as_bytes()));
        payload.extend_from_slice(&varint_encode(*child as u64));
        payloads.push(payload);
    }
    let interior = leaf_node(&payloads);

    let mut out = Vec::new();
    out.push(1); // one descent level
    out.push((interior_offset >> 16) as u8);
    out.push((interior_offset >> 8) as u8);
    out.push(interior_offset as u8);
    out.extend_from_slice(&(leaf_nodes.len() as u16).to_be_bytes());
    for leaf in &leaf_nodes {
        out.extend_from_slice(leaf);
    }
    out.extend_from_slice(&interior);
    out
}

// ── Record builders ──────────────────────────────────────────────────────

pub fn string_record(value: &[u8]) -> Vec<u8> {
    let mut record = varint_encode(value.len() as u64);
    record.extend_from_slice(value);
    record
}

pub fn entry_record(flags: u8, name_index: u32, ext_index: Option<u32>, link_index: u32) -> Vec<u8> {
    let mut record = vec![flags];
    record.extend_from_slice(&varint_encode(name_index.into()));
    if let Some(ext_index) = ext_index {
        record.extend_from_slice(&varint_encode(ext_index.into()));
    }
    record.extend_from_slice(&varint_encode(link_index.into()));
    record
}

pub fn node_record(
    flags: u8,
    node_index: u32,
    stored_size: u32,
    uncompressed_size: Option<u32>,
    volume_index: Option<u32>,
    sector_index: u32,
) -> Vec<u8> {
    let mut record = vec![flags];
    record.extend_from_slice(&varint_encode(node_index.into()));
    record.extend_from_slice(&varint_encode(stored_size.into()));
    if let Some(size) = uncompressed_size {
        record.extend_from_slice(&varint_encode(size.into()));
    }
    if let Some(volume) = volume_index {
        record.extend_from_slice(&varint_encode(volume.into()));
    }
    record.extend_from_slice(&varint_encode(sector_index.into()));
    record
}

// ── Compression builders ─────────────────────────────────────────────────

pub fn deflate_raw(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(data, Compression::default());
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).expect("deflate");
    out
}

/// Wrap `plain` in the little-endian deflate mini-header.
pub fn z_wrap(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&Z_MAGIC.to_le_bytes());
    out.extend_from_slice(&0u32.wrapping_sub(plain.len() as u32).to_le_bytes());
    out.extend_from_slice(&deflate_raw(plain));
    out
}

/// Build an expanded container around `plain`, chunked so every segment's
/// header and deflate data fit inside `segment_size`.
pub fn build_expanded(plain: &[u8], segment_size: u32) -> Vec<u8> {
    let seg = segment_size as usize;
    let chunk_size = (seg / 2).max(1);

    let mut out = vec![0u8; SUPER_HEADER_SIZE];
    for (i, chunk) in plain.chunks(chunk_size).enumerate() {
        if i > 0 {
            assert!(out.len() <= seg * i, "segment overflow");
            out.resize(seg * i, 0);
        }
        let z = deflate_raw(chunk);
        out.extend_from_slice(&0x0047_4553u32.to_le_bytes()); // segment magic, unchecked on read
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(&(z.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // checksum, unchecked on read
        out.extend_from_slice(&z);
        assert!(out.len() <= seg * (i + 1), "segment overflow");
    }

    let file_size = out.len() as u32;
    out[0..4].copy_from_slice(&EXPAND_MAGIC.to_le_bytes());
    out[4..8].copy_from_slice(&(plain.len() as u32).to_le_bytes());
    out[8..12].copy_from_slice(&file_size.to_le_bytes());
    out[12..16].copy_from_slice(&segment_size.to_le_bytes());
    out
}

// ── Header encryption (inverse of the read path) ─────────────────────────

/// Inverse of [`keyset::crypt_blocks`]: chain forward so the decrypt pass
/// reproduces `data`.
pub fn encrypt_blocks(data: &mut [u8]) {
    let mut prev: Option<u32> = None;
    for chunk in data.chunks_exact_mut(4) {
        let plain = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let enc = match prev {
            None => plain,
            Some(prev) => plain ^ keyset::shuffle_bits(prev),
        };
        chunk.copy_from_slice(&enc.to_be_bytes());
        prev = Some(enc);
    }
}

/// Inverse of [`keyset::crypt_blocks_swap_endian`]: plaintext words are
/// little-endian, the encrypted words land big-endian on disk.
pub fn encrypt_blocks_swap_endian(data: &mut [u8]) {
    let mut prev: Option<u32> = None;
    for chunk in data.chunks_exact_mut(4) {
        let plain = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let enc = match prev {
            None => plain,
            Some(prev) => plain ^ keyset::shuffle_bits(prev),
        };
        chunk.copy_from_slice(&enc.to_be_bytes());
        prev = Some(enc);
    }
}

// ── Whole-archive builders ───────────────────────────────────────────────

fn put_u32(out: &mut Vec<u8>, big_endian: bool, value: u32) {
    if big_endian {
        out.extend_from_slice(&value.to_be_bytes());
    } else {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Assemble an index blob: segment header plus name, extension, entry, and
/// node trees, all single-leaf.
pub fn build_index_blob(
    big_endian: bool,
    names: &[&str],
    exts: &[&str],
    entry_trees: &[Vec<Vec<u8>>],
    node_records: &[Vec<u8>],
) -> Vec<u8> {
    let name_tree = tree_depth0(
        &names
            .iter()
            .map(|n| string_record(n.as_bytes()))
            .collect::<Vec<_>>(),
    );
    let ext_tree = tree_depth0(
        &exts
            .iter()
            .map(|e| string_record(e.as_bytes()))
            .collect::<Vec<_>>(),
    );
    let entry_tree_blobs: Vec<Vec<u8>> = entry_trees.iter().map(|t| tree_depth0(t)).collect();
    let node_tree = tree_depth0(node_records);

    let header_len = 20 + 4 * entry_trees.len();
    let name_offset = header_len;
    let ext_offset = name_offset + name_tree.len();
    let mut entry_offsets = Vec::with_capacity(entry_tree_blobs.len());
    let mut cursor = ext_offset + ext_tree.len();
    for tree in &entry_tree_blobs {
        entry_offsets.push(cursor);
        cursor += tree.len();
    }
    let node_offset = cursor;

    let mut blob = Vec::new();
    put_u32(&mut blob, big_endian, SEGMENT_MAGIC);
    put_u32(&mut blob, big_endian, name_offset as u32);
    put_u32(&mut blob, big_endian, ext_offset as u32);
    put_u32(&mut blob, big_endian, node_offset as u32);
    put_u32(&mut blob, big_endian, entry_trees.len() as u32);
    for offset in &entry_offsets {
        put_u32(&mut blob, big_endian, *offset as u32);
    }
    blob.extend_from_slice(&name_tree);
    blob.extend_from_slice(&ext_tree);
    for tree in &entry_tree_blobs {
        blob.extend_from_slice(tree);
    }
    blob.extend_from_slice(&node_tree);
    blob
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Assemble a complete T5/T6 primary file: encrypted header, encrypted and
/// deflated index, node payloads at their sectors. `payloads` are
/// pre-encrypted bytes keyed by ascending sector index.
pub fn build_classic_archive(
    dialect: Dialect,
    index_blob: &[u8],
    seed: u32,
    title: &str,
    payloads: &[(u32, Vec<u8>)],
) -> Vec<u8> {
    let keyset = dialect.keyset();

    let mut zdata = z_wrap(index_blob);
    keyset.crypt_bytes(&mut zdata, seed);
    let z_size = zdata.len() as u32;
    let data_offset = align_up(SEGMENT_SIZE + u64::from(z_size), SEGMENT_SIZE);

    let mut header = Vec::new();
    header.extend_from_slice(&HEADER_MAGIC.to_be_bytes());
    header.extend_from_slice(&seed.to_be_bytes());
    header.extend_from_slice(&z_size.to_be_bytes());
    header.extend_from_slice(&(index_blob.len() as u32).to_be_bytes());
    header.extend_from_slice(&0u64.to_be_bytes()); // reserved
    header.extend_from_slice(&0u64.to_be_bytes()); // archive file size, unread
    let mut title_field = [0u8; 128];
    title_field[..title.len()].copy_from_slice(title.as_bytes());
    header.extend_from_slice(&title_field);

    encrypt_blocks(&mut header);
    keyset.crypt_bytes(&mut header, 1);

    let mut file = header;
    file.resize(SEGMENT_SIZE as usize, 0);
    file.extend_from_slice(&zdata);
    file.resize(data_offset as usize, 0);
    for (sector, payload) in payloads {
        let offset = data_offset as usize + *sector as usize * 0x800;
        assert!(file.len() <= offset, "overlapping payloads");
        file.resize(offset, 0);
        file.extend_from_slice(payload);
    }
    file
}

/// Assemble a T7 primary (index) file naming `volumes` as sibling data
/// files.
pub fn build_t7_index_file(index_blob: &[u8], seed: u32, volumes: &[(&str, u64)]) -> Vec<u8> {
    let keyset = Dialect::T7.keyset();

    let mut zdata = z_wrap(index_blob);
    keyset.crypt_bytes(&mut zdata, seed);

    let mut header = Vec::new();
    header.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
    header.extend_from_slice(&[0u8; 16]); // opaque words
    header.extend_from_slice(&[0u8; 0xDC]);
    header.extend_from_slice(&seed.to_le_bytes());
    header.extend_from_slice(&(zdata.len() as u32).to_le_bytes());
    header.extend_from_slice(&(index_blob.len() as u32).to_le_bytes());
    header.extend_from_slice(&(volumes.len() as u32).to_le_bytes());
    for (name, size) in volumes {
        let mut field = [0u8; 16];
        field[..name.len()].copy_from_slice(name.as_bytes());
        header.extend_from_slice(&field);
        header.extend_from_slice(&size.rotate_left(32).to_le_bytes());
    }
    header.resize(0xA60, 0);

    // The decrypt path XORs the first word after the block pass, so bake
    // the tweak in before inverting the chain.
    let word0 = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) ^ T7_HEADER_TWEAK;
    header[0..4].copy_from_slice(&word0.to_le_bytes());
    encrypt_blocks_swap_endian(&mut header);
    keyset.crypt_bytes(&mut header, 1);

    let mut file = header;
    file.resize(SEGMENT_SIZE as usize, 0);
    file.extend_from_slice(&zdata);
    // The header read spans 0xA60 bytes even though the index starts at
    // 0x800; keep the file long enough for it.
    if file.len() < 0xA60 {
        file.resize(0xA60, 0);
    }
    file
}

/// Assemble a T7 data file: extended header plus pre-encrypted payloads at
/// ascending sector indices (sector 0 is occupied by the header).
pub fn build_t7_data_file(sector_size: u32, payloads: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut file = Vec::new();
    file.extend_from_slice(&EXT_HEADER_MAGIC.to_le_bytes());
    file.extend_from_slice(&sector_size.to_le_bytes());
    file.extend_from_slice(&0x400u32.to_le_bytes()); // segment size
    file.extend_from_slice(&0u64.to_le_bytes()); // file size, patched below
    file.extend_from_slice(&0u32.to_le_bytes()); // flags
    file.extend_from_slice(&0u32.to_le_bytes()); // reserved

    for (sector, payload) in payloads {
        let offset = *sector as usize * sector_size as usize;
        assert!(file.len() <= offset, "overlapping payloads");
        file.resize(offset, 0);
        file.extend_from_slice(payload);
    }

    let size = file.len() as u64;
    file[16..24].copy_from_slice(&size.to_le_bytes());
    file
}
