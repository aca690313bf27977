//! tvol-tool — CLI for T-series volume archives
//!
//! # Usage
//!
//! ```text
//! tvol-tool info    <archive>                     Header, index, and data-file overview
//! tvol-tool list    <archive>                     List every entry in the archive
//! tvol-tool cat     <archive> <path>              Extract one file to stdout
//! tvol-tool unpack  <archive> <out-dir>           Extract the whole archive
//! tvol-tool decrypt <in> <out> <key-hex>          Salsa20-decrypt a standalone file
//! ```
//!
//! `unpack` probes the archive as T5, then T6, then T7. `decrypt` takes a
//! 64-hex-digit (32-byte) key and uses a zero IV.

mod cmd_cat;
mod cmd_decrypt;
mod cmd_info;
mod cmd_list;
mod cmd_unpack;
mod style;

use std::env;
use std::process;

use style::{BOLD, DIM, GREEN, RED, RESET};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "info" => cmd_info::run(&args[2..]),
        "list" | "ls" => cmd_list::run(&args[2..]),
        "cat" => cmd_cat::run(&args[2..]),
        "unpack" => cmd_unpack::run(&args[2..]),
        "decrypt" => cmd_decrypt::run(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("{RED}Unknown command: {}{RESET}", args[1]);
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("{RED}error:{RESET} {e}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!(
        r#"
{BOLD}tvol-tool{RESET} — T-series volume archive explorer

{DIM}Decrypt the index, walk the entry trees, extract the files{RESET}

{BOLD}USAGE:{RESET}
    tvol-tool <COMMAND> [ARGS]

{BOLD}COMMANDS:{RESET}
    {GREEN}info{RESET}     <archive>                Header, index, and data-file overview
    {GREEN}list{RESET}     <archive>                List every entry in the archive
    {GREEN}cat{RESET}      <archive> <path>         Extract one file to stdout
    {GREEN}unpack{RESET}   <archive> <out-dir>      Extract the whole archive
    {GREEN}decrypt{RESET}  <in> <out> <key-hex>     Salsa20-decrypt a standalone file

{BOLD}EXAMPLES:{RESET}
    tvol-tool info game.vol
    tvol-tool list game.vol
    tvol-tool cat game.vol menu/title.bin > title.bin
    tvol-tool unpack game.vol extracted/
    tvol-tool decrypt save.dat save.bin 000102...1f
"#
    );
}
