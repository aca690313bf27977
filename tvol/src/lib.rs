//! Read-only reader for T-series encrypted volume archives.
//!
//! An archive is a primary index file (plus, for the newest generation, one
//! or more sibling data files) whose directory lives in a deflated,
//! stream-ciphered blob of bit-packed B-trees: a name table, an extension
//! table, a forest of entry trees, and a node tree mapping files to sectors
//! in the data streams. This crate decrypts the header, loads the index,
//! resolves logical paths, and extracts node payloads through their
//! per-node cipher and up to two compression layers.
//!
//! # Example
//!
//! ```no_run
//! use tvol::Volume;
//!
//! let mut volume = Volume::open("game.vol").unwrap();
//! let data = volume.read_file("menu/title.bin").unwrap();
//! println!("{} bytes", data.len());
//! ```

pub mod bits;
pub mod btree;
pub mod compress;
pub mod crc;
pub mod error;
pub mod expand;
pub mod header;
pub mod keys;
pub mod keyset;
pub mod salsa;
pub mod volume;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, VolumeError};
pub use header::{Dialect, Header};
pub use keys::{EntryKey, NodeKey, StringKey};
pub use volume::{EntryKind, StreamInfo, UnpackFailure, UnpackSummary, Volume, WalkEntry};
