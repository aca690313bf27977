use std::fs;
use std::process;

use crate::style::*;
use tvol::{salsa, VolumeError};

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 3 {
        eprintln!("Usage: tvol-tool decrypt <in> <out> <key-hex>");
        process::exit(1);
    }

    let input = &args[0];
    let output = &args[1];
    let key = parse_key(&args[2])?;

    let mut data = fs::read(input)?;

    println!("Decrypting file...");
    salsa::crypt_in_place(&key, &[0u8; salsa::IV_SIZE], &mut data);
    fs::write(output, &data)?;

    println!("{GREEN}Done!{RESET}");
    Ok(())
}

/// Parse a 64-hex-digit key, ignoring whitespace and case.
fn parse_key(text: &str) -> Result<[u8; salsa::KEY_SIZE], VolumeError> {
    let compact: String = text.split_whitespace().collect();
    let bytes = hex::decode(&compact)
        .map_err(|e| VolumeError::BadKey(format!("invalid hex: {e}")))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        VolumeError::BadKey(format!(
            "expected {} bytes, got {len}",
            salsa::KEY_SIZE
        ))
    })
}
