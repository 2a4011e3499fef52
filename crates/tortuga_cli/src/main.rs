use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tortuga::{
    config::Config,
    error::Error,
    metainfo::MetaInfo,
    peer::PeerId,
    torrent::Torrent,
    tracker::Tracker,
    utils::{sanitize_file_name, to_human_readable},
};

mod args;

use args::Args;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not set up logging: {e}");
    }

    let mut config = match &args.config {
        Some(path) => Config::from_path(path).await?,
        None => Config::load().await?,
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_peers) = args.max_peers {
        config.max_peers = max_peers.max(1);
    }

    let meta_info = MetaInfo::from_file(&args.torrent).await?;
    info!(
        "{:?} has {} pieces, info hash {}",
        meta_info.info.name,
        meta_info.info.piece_count(),
        meta_info.info_hash
    );

    let peer_id = PeerId::generate();

    let peers = if args.peers.is_empty() {
        let tracker = Tracker::new(&meta_info.announce)?;
        tracker
            .announce(
                &meta_info.info_hash,
                &peer_id,
                config.port,
                meta_info.info.length,
            )
            .await?
    } else {
        args.peers.clone()
    };

    let torrent = Torrent::from_meta_info(&meta_info, peers, peer_id);
    let data = torrent.download(&config).await?;

    let output = args
        .output
        .unwrap_or_else(|| sanitize_file_name(&meta_info.info.name).into());

    tokio::fs::write(&output, &data).await?;

    println!(
        "Saved {} to {}",
        to_human_readable(data.len() as u64),
        output.display()
    );

    Ok(())
}
