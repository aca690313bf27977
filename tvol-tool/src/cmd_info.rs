use std::process;

use crate::style::*;
use tvol::{Header, Volume};

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.is_empty() {
        eprintln!("Usage: tvol-tool info <archive>");
        process::exit(1);
    }

    let archive = &args[0];
    let volume = Volume::open(archive)?;

    header(&format!("Volume: {archive}"));

    section("Header");
    kv_highlight("Dialect", &volume.dialect().to_string());
    match volume.header() {
        Header::Classic(classic) => {
            kv("Title", &classic.title_id);
            kv(
                "Index (compressed)",
                &format_size(classic.compressed_index_size.into()),
            );
            kv("Index (decompressed)", &format_size(classic.index_size.into()));
            kv("Archive size", &format_size(classic.file_size));
        }
        Header::MultiVolume(multi) => {
            kv(
                "Index (compressed)",
                &format_size(multi.compressed_index_size.into()),
            );
            kv("Index (decompressed)", &format_size(multi.index_size.into()));
            kv("Data files", &multi.volumes.len().to_string());
        }
    }

    section("Index");
    kv("Loaded size", &format_commas(volume.index_len() as u64));
    kv("Entry trees", &volume.entry_tree_count().to_string());

    section("Data streams");
    for info in volume.stream_info() {
        kv(
            &info.path.display().to_string(),
            &format!(
                "{} (sector {}, segment {})",
                format_size(info.file_size),
                format_size(info.sector_size.into()),
                format_size(info.segment_size.into())
            ),
        );
    }
    println!();

    Ok(())
}
