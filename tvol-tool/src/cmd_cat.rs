use std::io::{self, Write};
use std::process;

use tvol::Volume;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 2 {
        eprintln!("Usage: tvol-tool cat <archive> <path>");
        process::exit(1);
    }

    let archive = &args[0];
    let path = &args[1];

    let mut volume = Volume::open(archive)?;
    let data = volume.read_file(path)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&data)?;

    Ok(())
}
