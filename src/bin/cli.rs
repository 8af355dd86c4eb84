//! One-shot, `argv[1]`-dispatched front-end: each invocation opens the
//! backing file, performs a single Core API or object-layer operation,
//! and exits. Contributes no algorithmic content of its own.

use dc::error::{Error, Result};
use dc::index::IndexFile;
use dc::object::ObjectStore;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("usage:");
    eprintln!("  dc init <path> <total-pages>");
    eprintln!("  dc insert <path> <key> <value>");
    eprintln!("  dc lookup <path> <key>");
    eprintln!("  dc remove <path> <key>");
    eprintln!("  dc mkdir <path> <parent-key> <name>");
    eprintln!("  dc touch <path> <parent-key> <name>");
    eprintln!("  dc ls <path> <key>");
    eprintln!("  dc write <path> <key> <data>");
    eprintln!("  dc read <path> <key>");
    std::process::exit(2);
}

fn parse_u64(s: &str) -> Result<u64> {
    s.parse().map_err(|_| Error::Internal(format!("not a u64: {}", s)))
}

fn run(args: &[String]) -> Result<()> {
    match args {
        [cmd, path, total_pages] if cmd == "init" => {
            let total_pages = parse_u64(total_pages)?;
            let index = IndexFile::create_file_system(path, total_pages)?;
            ObjectStore::new(&index).create_root_directory()?;
        }
        [cmd, path, key, value] if cmd == "insert" => {
            let key = parse_u64(key)?;
            let value = parse_u64(value)?;
            let index = IndexFile::open(path)?;
            match index.insert(key, value)? {
                Some(old) => println!("replaced {}", old),
                None => println!("inserted"),
            }
        }
        [cmd, path, key] if cmd == "lookup" => {
            let key = parse_u64(key)?;
            let index = IndexFile::open(path)?;
            match index.lookup(key)? {
                Some(v) => println!("{}", v),
                None => println!("(not found)"),
            }
        }
        [cmd, path, key] if cmd == "remove" => {
            let key = parse_u64(key)?;
            let index = IndexFile::open(path)?;
            match index.remove(key)? {
                Some(v) => println!("removed, old value {}", v),
                None => println!("(not found)"),
            }
        }
        [cmd, path, parent_key, name] if cmd == "mkdir" => {
            let parent_key = parse_u64(parent_key)?;
            let index = IndexFile::open(path)?;
            match ObjectStore::new(&index).add_directory(parent_key, name)? {
                Some(inode) => println!("{}", inode),
                None => println!("(parent not found)"),
            }
        }
        [cmd, path, parent_key, name] if cmd == "touch" => {
            let parent_key = parse_u64(parent_key)?;
            let index = IndexFile::open(path)?;
            match ObjectStore::new(&index).add_file(parent_key, name)? {
                Some(inode) => println!("{}", inode),
                None => println!("(parent not found)"),
            }
        }
        [cmd, path, key] if cmd == "ls" => {
            let key = parse_u64(key)?;
            let index = IndexFile::open(path)?;
            for entry in ObjectStore::new(&index).list_directory(key)? {
                println!("{:>8}  {:?}  {}", entry.inode, entry.kind, entry.name);
            }
        }
        [cmd, path, key, data] if cmd == "write" => {
            let key = parse_u64(key)?;
            let index = IndexFile::open(path)?;
            ObjectStore::new(&index).append_file(key, data.as_bytes())?;
        }
        [cmd, path, key] if cmd == "read" => {
            let key = parse_u64(key)?;
            let index = IndexFile::open(path)?;
            let data = ObjectStore::new(&index).read_file(key)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        _ => usage(),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
