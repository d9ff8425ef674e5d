use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Parser;

use remora::Torrent;

#[derive(Parser, Debug)]
#[command(version, about = "A command-line BitTorrent leecher, written in Rust.")]
struct Args {
    /// Path to the .torrent file
    torrent: Option<PathBuf>,

    /// Directory where the downloaded file is saved
    #[arg(short = 'd', long = "dest", default_value = ".")]
    dest: PathBuf,
}

/// Sanitize the filename suggested by the metainfo so it cannot
/// escape the destination directory.
fn sanitize_filename(filename: &str) -> String {
    let safe_name = filename.replace(['/', '\\'], "_");

    if safe_name.trim().is_empty() {
        "download".to_string()
    } else {
        safe_name
    }
}

fn run(args: Args) -> Result<()> {
    let torrent_path = match args.torrent {
        Some(path) => path,
        None => return Err(anyhow!("Missing file argument")),
    };

    if !Path::new(&torrent_path).exists() {
        return Err(anyhow!(
            "could not find torrent file: {}",
            torrent_path.display()
        ));
    }

    let torrent = Torrent::open(&torrent_path)?;
    let out_path = args.dest.join(sanitize_filename(torrent.name()));

    torrent.download(&out_path)?;

    println!("Saved in \"{}\".", out_path.display());

    Ok(())
}

fn main() {
    // Logging is opt-in via RUST_LOG
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }

    std::process::exit(0);
}
