use std::path::Path;
use std::process;

use crate::style::*;
use tvol::{EntryKind, Volume};

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 2 {
        eprintln!("Usage: tvol-tool unpack <archive> <out-dir>");
        process::exit(1);
    }

    let archive = &args[0];
    let out_dir = Path::new(&args[1]);

    let mut volume = Volume::open(archive)?;
    println!(
        "{DIM}Detected dialect:{RESET} {BOLD}{}{RESET}",
        volume.dialect()
    );
    if let Some(title) = volume.title_id() {
        println!("{DIM}Title:{RESET} {title}");
    }
    println!("Unpacking files...");

    let summary = volume.unpack_all_with(out_dir, |kind, path| match kind {
        EntryKind::Directory => println!("DIR:{path}"),
        EntryKind::File => println!("FILE:{path}"),
    })?;

    println!();
    println!(
        "  {GREEN}{}{RESET} file(s), {} directory(ies) written",
        summary.files, summary.directories
    );

    if !summary.failures.is_empty() {
        for failure in &summary.failures {
            eprintln!("{RED}error:{RESET} {}: {}", failure.path, failure.error);
        }
        eprintln!(
            "{RED}{} node(s) failed to unpack{RESET}",
            summary.failures.len()
        );
        process::exit(1);
    }

    println!("Done!");
    Ok(())
}
