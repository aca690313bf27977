use std::process;

use crate::style::*;
use tvol::{EntryKind, Volume};

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.is_empty() {
        eprintln!("Usage: tvol-tool list <archive>");
        process::exit(1);
    }

    let archive = &args[0];
    let volume = Volume::open(archive)?;
    let entries = volume.walk()?;

    header(&format!("{archive} ({})", volume.dialect()));
    println!();
    println!("  {DIM}{:<5} {:>12} {:>12}  {}{RESET}", "Kind", "Size", "Stored", "Path");
    println!("  {DIM}{}{RESET}", "-".repeat(64));

    for entry in &entries {
        let color = kind_color(entry.kind);
        let icon = kind_icon(entry.kind);
        let (size, stored) = if entry.kind == EntryKind::File {
            (format_size(entry.size), format_size(entry.stored_size))
        } else {
            ("-".to_string(), "-".to_string())
        };
        println!(
            "  {DIM}{icon}{RESET}   {:>12} {:>12}  {color}{}{RESET}",
            size, stored, entry.path
        );
    }

    println!();
    let files = entries.iter().filter(|e| e.kind == EntryKind::File).count();
    let dirs = entries
        .iter()
        .filter(|e| e.kind == EntryKind::Directory)
        .count();
    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!(
        "  {DIM}{} file(s), {} directory(ies), {} total{RESET}",
        files,
        dirs,
        format_size(total)
    );
    println!();

    Ok(())
}
