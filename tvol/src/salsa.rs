//! Salsa20 decryption for standalone encrypted files.
//!
//! Archive payloads use the [`Keyset`](crate::keyset::Keyset) ciphers; this
//! only backs the CLI `decrypt` mode, which takes a user-supplied 32-byte
//! key and a zero IV.

use cipher::{KeyIvInit, StreamCipher};
use salsa20::Salsa20;

pub const KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 8;

/// Apply the Salsa20 keystream to `data` in place. The cipher is symmetric,
/// so the same call encrypts and decrypts.
pub fn crypt_in_place(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], data: &mut [u8]) {
    let mut cipher = Salsa20::new(key.into(), iv.into());
    cipher.apply_keystream(data);
}
