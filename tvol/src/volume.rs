//! The archive reader: probing, index decryption, path resolution, and
//! extraction.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use crate::bits;
use crate::btree::BTree;
use crate::compress;
use crate::error::{Result, VolumeError};
use crate::expand;
use crate::header::{
    Dialect, ExtHeader, Header, SegmentHeader, DEFAULT_SECTOR_SIZE, DEFAULT_SEGMENT_SIZE,
    EXT_HEADER_SIZE, SEGMENT_SIZE, T7_HEADER_TWEAK,
};
use crate::keys::{EntryKey, EntryOps, NodeKey, NodeOps, StringKey, StringOps};
use crate::keyset;

/// One opened data file plus its addressing geometry.
struct DataStream {
    file: File,
    path: PathBuf,
    file_size: u64,
    sector_size: u32,
    segment_size: u32,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry found by [`Volume::walk`].
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub kind: EntryKind,
    /// Size after decompression (0 for directories).
    pub size: u64,
    /// Bytes occupied in the data file (0 for directories).
    pub stored_size: u64,
}

/// Outcome of a best-effort [`Volume::unpack_all`] run.
#[derive(Debug, Default)]
pub struct UnpackSummary {
    pub files: usize,
    pub directories: usize,
    pub failures: Vec<UnpackFailure>,
}

#[derive(Debug)]
pub struct UnpackFailure {
    pub path: String,
    pub error: VolumeError,
}

/// Geometry and size of one data stream, for reporting.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub sector_size: u32,
    pub segment_size: u32,
}

/// A loaded archive. Owns the decrypted index blob and the data streams;
/// read-only for its whole life.
pub struct Volume {
    dialect: Dialect,
    header: Header,
    index: Vec<u8>,
    segment: SegmentHeader,
    streams: Vec<DataStream>,
    data_offset: u64,
}

impl Volume {
    /// Probe the archive as T5, then T6, then T7, keeping the first dialect
    /// whose header decrypts and parses.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Volume> {
        let path = path.as_ref();
        // Surface missing/unreadable files as I/O errors rather than a
        // failed probe.
        File::open(path)?;

        for dialect in Dialect::PROBE_ORDER {
            match Volume::open_as(path, dialect) {
                Ok(volume) => return Ok(volume),
                Err(_) => continue,
            }
        }
        Err(VolumeError::UnsupportedDialect(path.display().to_string()))
    }

    /// Open the archive as a specific dialect.
    pub fn open_as<P: AsRef<Path>>(path: P, dialect: Dialect) -> Result<Volume> {
        let path = path.as_ref();
        let mut main = File::open(path)?;

        let mut header_bytes = vec![0u8; dialect.header_size()];
        main.read_exact(&mut header_bytes)?;
        decrypt_header(dialect, &mut header_bytes);
        let header = Header::parse(dialect, &header_bytes)?;

        // The deflated index blob sits at the first segment boundary.
        let mut index = read_at(
            &mut main,
            SEGMENT_SIZE,
            u64::from(header.compressed_index_size()),
        )?;
        dialect.keyset().crypt_bytes(&mut index, header.seed());
        if !compress::inflate_if_needed(&mut index, u64::from(header.index_size()))? {
            return Err(VolumeError::BadMagic {
                what: "index",
                expected: u64::from(compress::Z_MAGIC),
                actual: u64::from(bits::u32_le_at(&index, 0).unwrap_or(0)),
            });
        }
        let segment = SegmentHeader::parse(dialect, &index)?;

        let (streams, data_offset) = match &header {
            Header::Classic(classic) => {
                // The primary file doubles as the single data stream.
                let file = File::open(path)?;
                let file_size = file.metadata()?.len();
                let stream = DataStream {
                    file,
                    path: path.to_path_buf(),
                    file_size,
                    sector_size: DEFAULT_SECTOR_SIZE,
                    segment_size: DEFAULT_SEGMENT_SIZE,
                };
                let data_offset = align_up(
                    SEGMENT_SIZE + u64::from(classic.compressed_index_size),
                    SEGMENT_SIZE,
                );
                (vec![stream], data_offset)
            }
            Header::MultiVolume(multi) => {
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                let mut streams = Vec::with_capacity(multi.volumes.len());
                for info in &multi.volumes {
                    let data_path = base.join(&info.file_name);
                    let mut file = File::open(&data_path)?;
                    let file_size = file.metadata()?.len();

                    let mut ext_bytes = [0u8; EXT_HEADER_SIZE];
                    file.read_exact(&mut ext_bytes)?;
                    let ext = ExtHeader::parse(&ext_bytes)?;

                    streams.push(DataStream {
                        file,
                        path: data_path,
                        file_size,
                        sector_size: ext.sector_size,
                        segment_size: ext.segment_size,
                    });
                }
                (streams, 0)
            }
        };

        Ok(Volume {
            dialect,
            header,
            index,
            segment,
            streams,
            data_offset,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Title identifier carried by T5/T6 headers.
    pub fn title_id(&self) -> Option<&str> {
        match &self.header {
            Header::Classic(classic) => Some(&classic.title_id),
            Header::MultiVolume(_) => None,
        }
    }

    /// Size of the decrypted, inflated index blob.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    pub fn entry_tree_count(&self) -> u32 {
        self.segment.entry_tree_offsets.len() as u32
    }

    pub fn stream_info(&self) -> Vec<StreamInfo> {
        self.streams
            .iter()
            .map(|stream| StreamInfo {
                path: stream.path.clone(),
                file_size: stream.file_size,
                sector_size: stream.sector_size,
                segment_size: stream.segment_size,
            })
            .collect()
    }

    // ── Tree access ──────────────────────────────────────────────────────

    fn tree_at(&self, offset: u32) -> Result<&[u8]> {
        self.index
            .get(offset as usize..)
            .ok_or(VolumeError::Truncated(offset as usize))
    }

    fn name_tree(&self) -> Result<BTree<'_, StringOps>> {
        Ok(BTree::new(
            self.tree_at(self.segment.name_tree_offset)?,
            StringOps,
        ))
    }

    fn ext_tree(&self) -> Result<BTree<'_, StringOps>> {
        Ok(BTree::new(
            self.tree_at(self.segment.ext_tree_offset)?,
            StringOps,
        ))
    }

    fn node_tree(&self) -> Result<BTree<'_, NodeOps>> {
        Ok(BTree::new(
            self.tree_at(self.segment.node_tree_offset)?,
            NodeOps {
                multi_volume: self.streams.len() > 1,
            },
        ))
    }

    fn entry_tree(&self, tree_index: u32) -> Result<BTree<'_, EntryOps>> {
        let offset = self
            .segment
            .entry_tree_offsets
            .get(tree_index as usize)
            .copied()
            .ok_or_else(|| VolumeError::NotFound(format!("entry tree {tree_index}")))?;
        Ok(BTree::new(self.tree_at(offset)?, EntryOps))
    }

    fn node_key(&self, node_index: u32) -> Result<Option<NodeKey>> {
        let tree = self.node_tree()?;
        Ok(tree
            .search_by_key(&NodeKey::search(node_index))?
            .map(|(_, key)| key))
    }

    fn entries_of(&self, tree_index: u32) -> Result<Vec<EntryKey>> {
        let tree = self.entry_tree(tree_index)?;
        let mut entries = Vec::new();
        tree.traverse(|key| {
            entries.push(key);
            true
        })?;
        Ok(entries)
    }

    // ── Path resolution ──────────────────────────────────────────────────

    /// Resolve a logical path to its node placement record.
    ///
    /// Components are split on `/` with empty tokens collapsed; each is
    /// looked up by name and (when a `.` is present) extension, then in the
    /// current entry tree. Directory entries switch to the linked entry
    /// tree, file entries end the walk at the node tree.
    pub fn node_by_path(&self, path: &str) -> Result<NodeKey> {
        if self.segment.entry_tree_offsets.is_empty() {
            return Err(VolumeError::NotFound(path.to_string()));
        }

        let normalized = self.dialect.normalize_path(path);
        let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(VolumeError::NotFound(path.to_string()));
        }

        let name_tree = self.name_tree()?;
        let ext_tree = self.ext_tree()?;

        let mut entry_tree_index = 0u32;
        let mut node_index = None;
        for part in parts {
            let (name, ext) = split_extension(part);
            let Some((name_index, _)) = name_tree.search_by_key(&StringKey::new(name.as_bytes()))?
            else {
                break;
            };
            let ext_index = match ext {
                Some(ext) => {
                    match ext_tree.search_by_key(&StringKey::new(ext.as_bytes()))? {
                        Some((index, _)) => index,
                        None => break,
                    }
                }
                None => 0,
            };

            let entry_tree = self.entry_tree(entry_tree_index)?;
            let Some((_, entry)) =
                entry_tree.search_by_key(&EntryKey::search(name_index, ext_index))?
            else {
                break;
            };

            if entry.is_directory() {
                entry_tree_index = entry.link_index;
            } else {
                node_index = Some(entry.link_index);
                break;
            }
        }

        let node_index = node_index.ok_or_else(|| VolumeError::NotFound(path.to_string()))?;
        self.node_key(node_index)?
            .ok_or_else(|| VolumeError::NotFound(path.to_string()))
    }

    /// Build the logical path of `entry` below `prefix`. Directories get a
    /// trailing separator, files their extension.
    pub fn entry_path(&self, entry: &EntryKey, prefix: &str) -> Result<String> {
        let mut path = String::from(prefix);

        let name = self.name_tree()?.search_by_index(entry.name_index)?;
        path.push_str(&String::from_utf8_lossy(name.value));

        if entry.is_file() {
            let ext = self.ext_tree()?.search_by_index(entry.ext_index)?;
            if !ext.is_empty() {
                path.push_str(&String::from_utf8_lossy(ext.value));
            }
        } else if entry.is_directory() {
            path.push('/');
        }
        Ok(path)
    }

    /// Recursively list every entry reachable from the root entry tree.
    pub fn walk(&self) -> Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        if self.segment.entry_tree_offsets.is_empty() {
            return Ok(entries);
        }
        self.walk_tree(0, "", &mut entries)?;
        Ok(entries)
    }

    fn walk_tree(&self, tree_index: u32, prefix: &str, out: &mut Vec<WalkEntry>) -> Result<()> {
        for entry in self.entries_of(tree_index)? {
            let path = self.entry_path(&entry, prefix)?;
            if entry.is_directory() {
                out.push(WalkEntry {
                    path: path.trim_end_matches('/').to_string(),
                    kind: EntryKind::Directory,
                    size: 0,
                    stored_size: 0,
                });
                self.walk_tree(entry.link_index, &path, out)?;
            } else {
                let node = self.node_key(entry.link_index)?;
                let (size, stored_size) = node
                    .map(|n| (u64::from(n.uncompressed_size), u64::from(n.stored_size)))
                    .unwrap_or((0, 0));
                out.push(WalkEntry {
                    path,
                    kind: EntryKind::File,
                    size,
                    stored_size,
                });
            }
        }
        Ok(())
    }

    // ── Extraction ───────────────────────────────────────────────────────

    /// Read, decrypt, and decompress one node's payload.
    pub fn read_node(&mut self, node: &NodeKey) -> Result<Vec<u8>> {
        let data_offset = self.data_offset;
        let keyset = self.dialect.keyset();
        let stream = self
            .streams
            .get_mut(node.volume_index as usize)
            .ok_or_else(|| VolumeError::NotFound(format!("data volume {}", node.volume_index)))?;

        let offset = data_offset + u64::from(node.sector_index) * u64::from(stream.sector_size);
        let mut data = read_at(&mut stream.file, offset, u64::from(node.stored_size))?;

        keyset.crypt_bytes(&mut data, node.node_index);
        compress::inflate_if_needed(&mut data, u64::from(node.uncompressed_size))?;

        if expand::is_expanded(&data) {
            return expand::unexpand(&data);
        }
        Ok(data)
    }

    /// Read an entire file by logical path.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let node = self.node_by_path(path)?;
        self.read_node(&node)
    }

    /// Extract one node to `out_path`, creating parent directories. Nothing
    /// is written when decryption or decompression fails.
    pub fn unpack_node(&mut self, node: &NodeKey, out_path: &Path) -> Result<()> {
        let data = self.read_node(node)?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(out_path, &data)?;
        Ok(())
    }

    /// Extract every entry under `out_dir`. Per-node failures are recorded
    /// in the summary and do not stop the traversal.
    pub fn unpack_all(&mut self, out_dir: &Path) -> Result<UnpackSummary> {
        self.unpack_all_with(out_dir, |_, _| {})
    }

    /// [`unpack_all`](Volume::unpack_all) with a progress callback invoked
    /// for every entry before it is processed.
    pub fn unpack_all_with<F>(&mut self, out_dir: &Path, mut progress: F) -> Result<UnpackSummary>
    where
        F: FnMut(EntryKind, &str),
    {
        if self.segment.entry_tree_offsets.is_empty() {
            return Err(VolumeError::NotFound("root entry tree".to_string()));
        }
        let mut summary = UnpackSummary::default();
        self.unpack_tree(0, "", out_dir, &mut summary, &mut progress)?;
        Ok(summary)
    }

    fn unpack_tree<F>(
        &mut self,
        tree_index: u32,
        prefix: &str,
        out_dir: &Path,
        summary: &mut UnpackSummary,
        progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(EntryKind, &str),
    {
        for entry in self.entries_of(tree_index)? {
            let path = self.entry_path(&entry, prefix)?;
            let full = out_dir.join(&path);
            if entry.is_directory() {
                progress(EntryKind::Directory, &path);
                fs::create_dir_all(&full)?;
                summary.directories += 1;
                self.unpack_tree(entry.link_index, &path, out_dir, summary, progress)?;
            } else {
                progress(EntryKind::File, &path);
                match self.unpack_file_entry(&entry, &full) {
                    Ok(()) => summary.files += 1,
                    Err(error) => summary.failures.push(UnpackFailure {
                        path: path.clone(),
                        error,
                    }),
                }
            }
        }
        Ok(())
    }

    fn unpack_file_entry(&mut self, entry: &EntryKey, out_path: &Path) -> Result<()> {
        let node = self
            .node_key(entry.link_index)?
            .ok_or_else(|| VolumeError::NotFound(format!("node {}", entry.link_index)))?;
        self.unpack_node(&node, out_path)
    }
}

fn decrypt_header(dialect: Dialect, bytes: &mut [u8]) {
    dialect.keyset().crypt_bytes(bytes, 1);
    match dialect {
        Dialect::T5 | Dialect::T6 => keyset::crypt_blocks(bytes),
        Dialect::T7 => {
            keyset::crypt_blocks_swap_endian(bytes);
            let first = LittleEndian::read_u32(&bytes[0..4]) ^ T7_HEADER_TWEAK;
            LittleEndian::write_u32(&mut bytes[0..4], first);
        }
    }
}

fn read_at(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>> {
    let mut data = vec![0u8; size as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut data)?;
    Ok(data)
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Split a path component at the last dot; the extension keeps the dot.
fn split_extension(part: &str) -> (&str, Option<&str>) {
    match part.rfind('.') {
        Some(pos) => (&part[..pos], Some(&part[pos..])),
        None => (part, None),
    }
}
