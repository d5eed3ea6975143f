//! Inspect a content document without a type registry.
//!
//! Prints the object count, declared identities, external dependencies and
//! identifier references that point at nothing in the document.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use redlilium_content::{ContentPath, Document, Format};

#[derive(Debug, Parser)]
#[command(name = "content-inspect", about = "Inspect a content document")]
struct Args {
    /// Document to inspect.
    file: PathBuf,

    /// Exit with an error when identifier references do not resolve.
    #[arg(long)]
    deny_dangling: bool,

    /// List every declared identity.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let bytes = match std::fs::read(&args.file) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("Failed to read {}: {err}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let format = args
        .file
        .to_str()
        .and_then(|p| ContentPath::new(p).ok())
        .map_or(Format::Json, |p| Format::for_path(&p));
    let document = match Document::decode(&bytes, format) {
        Ok(document) => document,
        Err(err) => {
            log::error!("{}: {err}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let identities = document.identities();
    let dependencies = document.dependencies();
    let dangling = document.dangling_references();

    println!("{}", args.file.display());
    println!("  objects:      {}", document.object_count());
    println!("  identities:   {}", identities.len());
    if args.verbose {
        for id in &identities {
            println!("    {id}");
        }
    }
    println!("  dependencies: {}", dependencies.len());
    for path in &dependencies {
        println!("    {path}");
    }
    println!("  dangling:     {}", dangling.len());
    for id in &dangling {
        println!("    {id}");
    }

    if args.deny_dangling && !dangling.is_empty() {
        log::error!("{} dangling references", dangling.len());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
