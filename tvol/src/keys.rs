//! The three key types stored in the index trees.
//!
//! Name and extension tables are string trees; the directory hierarchy is a
//! forest of entry trees keyed by `(name index, extension index)`; node
//! placement records live in a single node tree keyed by node index.

use std::cmp::Ordering;

use crate::bits;
use crate::btree::KeyOps;
use crate::error::Result;

// ── String keys ──────────────────────────────────────────────────────────

/// A string-tree key: raw bytes borrowed from the index blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringKey<'a> {
    pub value: &'a [u8],
}

impl<'a> StringKey<'a> {
    pub fn new(value: &'a [u8]) -> Self {
        StringKey { value }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Leaf record: `length` varint followed by that many bytes. Interior
/// records prefix the subtree's key-index bound.
pub struct StringOps;

impl<'a> KeyOps<'a> for StringOps {
    type Key = StringKey<'a>;

    fn parse(&self, data: &'a [u8], pos: &mut usize) -> Result<StringKey<'a>> {
        let length = bits::varint(data, pos)? as usize;
        let value = bits::bytes_at(data, *pos, length)?;
        *pos += length;
        Ok(StringKey { value })
    }

    fn advance(&self, data: &'a [u8], pos: &mut usize) -> Result<()> {
        self.parse(data, pos).map(|_| ())
    }

    fn compare_exact(&self, key: &StringKey<'a>, data: &'a [u8], pos: usize) -> Result<Ordering> {
        let mut pos = pos;
        let length = bits::varint(data, &mut pos)? as usize;
        let other = bits::bytes_at(data, pos, length)?;
        // Byte-wise with length as the tiebreak, which is plain slice order.
        Ok(key.value.cmp(other))
    }

    fn compare_separator(
        &self,
        key: &StringKey<'a>,
        data: &'a [u8],
        pos: usize,
    ) -> Result<Ordering> {
        let mut pos = pos;
        bits::varint(data, &mut pos)?; // subtree key-index bound
        match self.compare_exact(key, data, pos)? {
            Ordering::Equal => Ok(Ordering::Greater),
            order => Ok(order),
        }
    }
}

// ── Entry keys ───────────────────────────────────────────────────────────

pub const ENTRY_FLAG_DIRECTORY: u8 = 1 << 0;
pub const ENTRY_FLAG_FILE: u8 = 1 << 1;

/// A directory entry: a named file or subdirectory.
///
/// For directories `link_index` selects the child entry tree; for files it
/// is the node index to look up in the node tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryKey {
    pub flags: u8,
    pub name_index: u32,
    pub ext_index: u32,
    pub link_index: u32,
}

impl EntryKey {
    /// A lookup key for `(name, extension)`; flags and link are filled in
    /// by the search.
    pub fn search(name_index: u32, ext_index: u32) -> Self {
        EntryKey {
            flags: 0,
            name_index,
            ext_index,
            link_index: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.flags & ENTRY_FLAG_DIRECTORY != 0
    }

    pub fn is_file(&self) -> bool {
        self.flags & ENTRY_FLAG_FILE != 0
    }
}

/// Leaf record: `flags`, name index, extension index (files only), link
/// index. Interior records hold name and extension indices plus the child
/// offset; there is no separate bound prefix, so the positions reported by
/// `search_by_key` on entry trees carry no meaning.
pub struct EntryOps;

impl<'a> KeyOps<'a> for EntryOps {
    type Key = EntryKey;

    fn parse(&self, data: &'a [u8], pos: &mut usize) -> Result<EntryKey> {
        let flags = bits::u8_at(data, *pos)?;
        *pos += 1;
        let name_index = bits::varint(data, pos)? as u32;
        let ext_index = if flags & ENTRY_FLAG_FILE != 0 {
            bits::varint(data, pos)? as u32
        } else {
            0
        };
        let link_index = bits::varint(data, pos)? as u32;
        Ok(EntryKey {
            flags,
            name_index,
            ext_index,
            link_index,
        })
    }

    fn advance(&self, data: &'a [u8], pos: &mut usize) -> Result<()> {
        bits::varint(data, pos)?;
        Ok(())
    }

    fn compare_exact(&self, key: &EntryKey, data: &'a [u8], pos: usize) -> Result<Ordering> {
        let mut pos = pos;
        let flags = bits::u8_at(data, pos)?;
        pos += 1;
        let name_index = bits::varint(data, &mut pos)? as u32;
        let order = key.name_index.cmp(&name_index);
        if order != Ordering::Equal {
            return Ok(order);
        }
        let ext_index = if flags & ENTRY_FLAG_FILE != 0 {
            bits::varint(data, &mut pos)? as u32
        } else {
            0
        };
        Ok(key.ext_index.cmp(&ext_index))
    }

    fn compare_separator(&self, key: &EntryKey, data: &'a [u8], pos: usize) -> Result<Ordering> {
        let mut pos = pos;
        let name_index = bits::varint(data, &mut pos)? as u32;
        let order = key.name_index.cmp(&name_index);
        if order != Ordering::Equal {
            return Ok(order);
        }
        let ext_index = bits::varint(data, &mut pos)? as u32;
        match key.ext_index.cmp(&ext_index) {
            Ordering::Equal => Ok(Ordering::Greater),
            order => Ok(order),
        }
    }
}

// ── Node keys ────────────────────────────────────────────────────────────

pub const NODE_FLAG_COMPRESSED: u8 = 1 << 0;

/// Mask of the flag bits that signal a separately stored uncompressed size.
pub const NODE_FLAG_SIZE_BITS: u8 = 0x0F;

/// Placement record for one stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeKey {
    pub flags: u8,
    pub node_index: u32,
    /// Bytes occupied in the data file.
    pub stored_size: u32,
    /// Size after the deflate layer; equals `stored_size` for plain nodes.
    pub uncompressed_size: u32,
    pub volume_index: u32,
    pub sector_index: u32,
}

impl NodeKey {
    /// A lookup key for `node_index`; the other fields are filled in by the
    /// search.
    pub fn search(node_index: u32) -> Self {
        NodeKey {
            flags: 0,
            node_index,
            stored_size: 0,
            uncompressed_size: 0,
            volume_index: 0,
            sector_index: 0,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & NODE_FLAG_COMPRESSED != 0
    }
}

/// Leaf record: `flags`, node index, stored size, uncompressed size (only
/// when any of the low four flag bits is set), volume index (only in
/// multi-volume archives), sector index. Interior records hold the node
/// index and the child offset.
pub struct NodeOps {
    pub multi_volume: bool,
}

impl<'a> KeyOps<'a> for NodeOps {
    type Key = NodeKey;

    fn parse(&self, data: &'a [u8], pos: &mut usize) -> Result<NodeKey> {
        let flags = bits::u8_at(data, *pos)?;
        *pos += 1;
        let node_index = bits::varint(data, pos)? as u32;
        let stored_size = bits::varint(data, pos)? as u32;
        let uncompressed_size = if flags & NODE_FLAG_SIZE_BITS != 0 {
            bits::varint(data, pos)? as u32
        } else {
            stored_size
        };
        let volume_index = if self.multi_volume {
            bits::varint(data, pos)? as u32
        } else {
            0
        };
        let sector_index = bits::varint(data, pos)? as u32;
        Ok(NodeKey {
            flags,
            node_index,
            stored_size,
            uncompressed_size,
            volume_index,
            sector_index,
        })
    }

    fn advance(&self, _data: &'a [u8], _pos: &mut usize) -> Result<()> {
        Ok(())
    }

    fn compare_exact(&self, key: &NodeKey, data: &'a [u8], pos: usize) -> Result<Ordering> {
        let mut pos = pos;
        bits::u8_at(data, pos)?;
        pos += 1;
        let node_index = bits::varint(data, &mut pos)? as u32;
        Ok(key.node_index.cmp(&node_index))
    }

    fn compare_separator(&self, key: &NodeKey, data: &'a [u8], pos: usize) -> Result<Ordering> {
        let mut pos = pos;
        let node_index = bits::varint(data, &mut pos)? as u32;
        match key.node_index.cmp(&node_index) {
            Ordering::Equal => Ok(Ordering::Greater),
            order => Ok(order),
        }
    }
}
