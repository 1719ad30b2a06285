// feedsync node
//
// Usage:
//   feedsync keygen --secondary-a 192.168.49.1 --secondary-b 192.168.49.2
//   feedsync listen --port 4100 --bundle '<oob>' --feed news,TCP,10.0.0.1,7000
//   feedsync connect 127.0.0.1:4100 --bundle '<oob>'
//
// connect exits once phase one completes; listen runs until interrupted.
//
// RUST_LOG controls verbosity (default: info).

use clap::{Parser, Subcommand};
use feedsync::{
    EventSink, Feed, FeedType, FeedsyncConfig, KeyBundle, LinkEvent, PendingBundle,
    SessionContext, SessionManager, SledStore, Store, TcpTransport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[clap(name = "feedsync")]
#[clap(about = "Authenticated feed metadata sync between paired devices", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Database directory
    #[clap(long, global = true, default_value = "feedsync.db")]
    db: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept one peer session at a time
    Listen {
        /// Port to bind (overrides the config file)
        #[clap(long)]
        port: Option<u16>,
        #[clap(flatten)]
        node: NodeArgs,
    },
    /// Open a session to a listening peer
    Connect {
        address: String,
        #[clap(flatten)]
        node: NodeArgs,
    },
    /// Print a matching pair of out-of-band key bundles
    Keygen {
        #[clap(long)]
        secondary_a: Option<String>,
        #[clap(long)]
        secondary_b: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct NodeArgs {
    /// Out-of-band bundle used on first contact with an unknown peer
    #[clap(long)]
    bundle: Option<String>,

    /// Locally served feed as key,TYPE,host,port (repeatable)
    #[clap(long = "feed", value_parser = parse_feed)]
    feeds: Vec<Feed>,
}

fn parse_feed(s: &str) -> Result<Feed, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [key, feed_type, host, port] = parts.as_slice() else {
        return Err(format!("expected key,TYPE,host,port, got '{}'", s));
    };
    let feed_type: FeedType = feed_type.parse()?;
    Ok(Feed::resolved(key, feed_type, host, port).with_subscribed(true))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => FeedsyncConfig::load(path)?,
        None => FeedsyncConfig::default(),
    };

    match cli.command {
        Command::Keygen {
            secondary_a,
            secondary_b,
        } => {
            let (for_a, for_b) = KeyBundle::generate_pair(secondary_a, secondary_b);
            println!("device A: {}", for_a.to_oob());
            println!("device B: {}", for_b.to_oob());
            Ok(())
        }
        Command::Listen { port, node } => {
            if let Some(port) = port {
                config.transport.bind_port = port;
            }
            run_node(&cli.db, config, node, None).await
        }
        Command::Connect { address, node } => run_node(&cli.db, config, node, Some(address)).await,
    }
}

async fn run_node(
    db: &Path,
    config: FeedsyncConfig,
    node: NodeArgs,
    connect_to: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let store = Arc::new(SledStore::open(db)?);
    for feed in &node.feeds {
        store.upsert_feed(feed)?;
        store.set_subscribed(&feed.key, true)?;
    }
    let stats = store.stats();
    info!(
        db = %db.display(),
        feeds = store.list_feeds()?.len(),
        keys = stats.key_count,
        disk_bytes = stats.disk_size_bytes,
        "store opened"
    );

    let keys = match &node.bundle {
        Some(oob) => PendingBundle::with_bundle(KeyBundle::from_oob(oob)?),
        None => PendingBundle::new(),
    };

    let (events, mut rx) = EventSink::channel();
    let transport = Arc::new(TcpTransport::new(config.transport.clone()));
    let ctx = SessionContext::new(store.clone(), Arc::new(keys), config).with_events(events);
    let manager = SessionManager::new(transport, ctx);

    let one_shot = connect_to.is_some();
    match connect_to {
        Some(address) => manager.start_connecting(&address),
        None => {
            let address = manager.start_listening().await?;
            println!("listening on {}", address);
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let finished = matches!(
                    event,
                    LinkEvent::SessionClosed { .. }
                        | LinkEvent::TransportFailed { .. }
                        | LinkEvent::PhaseOneComplete { .. }
                );
                log_event(&event);
                if one_shot && finished {
                    break;
                }
            }
        }
    }

    manager.stop();
    store.flush()?;
    Ok(())
}

fn log_event(event: &LinkEvent) {
    match event {
        LinkEvent::PeerLearned { address } => info!(%address, "peer learned"),
        LinkEvent::Authenticated { address, role } => info!(%address, ?role, "authenticated"),
        LinkEvent::Rejected { address, reason } => warn!(%address, %reason, "peer rejected"),
        LinkEvent::TransportFailed { address, error } => {
            warn!(address = address.as_deref().unwrap_or("-"), %error, "transport failed")
        }
        LinkEvent::SessionClosed { address } => info!(%address, "session closed"),
        LinkEvent::FeedUpdated { key, from } => info!(feed = %key, %from, "feed updated"),
        LinkEvent::PhaseOneComplete { address } => info!(%address, "phase one complete"),
    }
}
