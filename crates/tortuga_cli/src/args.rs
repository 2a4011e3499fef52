use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[clap(name = "Tortuga")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path of the .torrent file to download.
    pub torrent: PathBuf,

    /// Where to write the file, defaults to the name in the torrent.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Download from this peer instead of asking the tracker, can be given
    /// more than once.
    #[clap(long = "peer")]
    pub peers: Vec<SocketAddr>,

    /// Path of a config file, instead of the one in the user's config dir.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Port reported to the tracker.
    #[clap(short, long)]
    pub port: Option<u16>,

    /// Maximum number of peers to download from at the same time.
    #[clap(long)]
    pub max_peers: Option<usize>,

    /// Log every message exchanged with peers.
    #[clap(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[clap(short, long)]
    pub quiet: bool,
}
