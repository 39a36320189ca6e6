//! Peer Pool node
//!
//! Runs the outbound peer pool until Ctrl+C, or inspects discovery and the
//! persisted peer directory.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use peer_pool::{
    DnsSeedResolver, Message, MessageSender, PeerDirectory, PeerListener, PeerPool,
    PeerPoolConfig, SeedResolver, SessionError,
};

/// Interval between keep-alive pings
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline granted to a session each time the peer shows activity
const ACTIVITY_DEADLINE: Duration = Duration::from_secs(90);

/// Peer Pool - outbound peer connections with a scored directory
#[derive(Parser, Debug)]
#[command(name = "peer-pool")]
#[command(author = "KratOs Contributors")]
#[command(version)]
#[command(about = "Outbound peer pool with DNS bootstrap and peer reputation", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "peer-pool.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Peer cache file (overrides config)
    #[arg(long, global = true)]
    peer_cache: Option<PathBuf>,

    /// Number of concurrent sessions (overrides config)
    #[arg(long, global = true)]
    pool_size: Option<usize>,

    /// Peer port (overrides config)
    #[arg(long, global = true)]
    peer_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the pool and run until Ctrl+C
    Run,

    /// Resolve the DNS seeds once and print the addresses
    Discover,

    /// Print the persisted peer directory in selection order
    Peers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Discover => discover(config).await,
        Commands::Peers => {
            print_peers(config);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PeerPoolConfig> {
    let config = if cli.config.exists() {
        PeerPoolConfig::load(&cli.config)?
    } else {
        debug!("Config file {} not found, using defaults", cli.config.display());
        PeerPoolConfig::default()
    };

    let config = config
        .with_pool_size(cli.pool_size)
        .with_peer_cache_path(cli.peer_cache.clone())
        .with_peer_port(cli.peer_port);

    config.validate()?;
    Ok(config)
}

async fn run(config: PeerPoolConfig) -> anyhow::Result<()> {
    info!("🌐 Peer Pool v{}", env!("CARGO_PKG_VERSION"));
    info!("⚙️  Configuration:");
    info!("   Pool size: {}", config.pool_size);
    info!("   Peer port: {}", config.peer_port);
    info!("   Peer cache: {}", config.peer_cache_path.display());
    info!("   DNS seeds: {}", config.dns_seeds.len());

    let resolver: Arc<dyn SeedResolver> =
        Arc::new(DnsSeedResolver::with_config(config.discovery_config()));
    let directory = PeerDirectory::initialize(config.directory_config(), Arc::clone(&resolver));

    let maintenance = config
        .rebootstrap_interval()
        .and_then(|interval| directory.spawn_maintenance(Arc::clone(&resolver), interval));

    let pool = Arc::new(PeerPool::new(
        config.pool_config(),
        Arc::clone(&directory),
        Arc::new(NodeListener),
    ));
    pool.start();

    let keepalive = tokio::spawn(run_keepalive(Arc::clone(&pool)));

    info!("✅ Peer pool running");
    info!("   Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("🛑 Shutdown signal received"),
                Err(e) => error!("Cannot listen for shutdown signal: {}", e),
            }
        }
        result = keepalive => {
            error!("Keep-alive task exited: {:?}", result);
        }
    }

    if let Some(maintenance) = maintenance {
        maintenance.abort();
    }

    pool.shutdown().await;
    directory.shutdown();

    info!("👋 Peer Pool shutting down");
    Ok(())
}

/// Ping every session periodically
async fn run_keepalive(pool: Arc<PeerPool>) {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let sent = pool.broadcast(Message::Ping {
            nonce: rand::random(),
        });
        debug!("Keep-alive ping sent to {} sessions", sent);
    }
}

async fn discover(config: PeerPoolConfig) -> anyhow::Result<()> {
    let resolver = DnsSeedResolver::with_config(config.discovery_config());
    let peers = resolver.resolve_seeds().await?;

    println!("Discovered {} peers:", peers.len());
    for ip in &peers {
        println!("  {}", ip);
    }
    Ok(())
}

fn print_peers(config: PeerPoolConfig) {
    let directory = PeerDirectory::open(config.directory_config());
    let stats = directory.stats();

    println!(
        "{} peers ({} in use), average score {:.2}",
        stats.total, stats.in_use, stats.average_score
    );
    for peer in directory.snapshot() {
        println!(
            "  {:<40} score {:>4}{}",
            peer.address,
            peer.score,
            if peer.in_use { "  [in use]" } else { "" }
        );
    }
}

/// Answers the handshake and keep-alive traffic of every session
struct NodeListener;

impl PeerListener for NodeListener {
    fn on_connected(&self, address: &str) {
        debug!("Session with {} established", address);
    }

    fn on_disconnected(&self, address: &str, error: Option<&SessionError>) {
        match error {
            None => debug!("Session with {} closed", address),
            Some(e) => debug!("Session with {} ended: {}", address, e),
        }
    }

    fn on_message(&self, sender: &dyn MessageSender, message: Message) {
        sender.set_deadline(ACTIVITY_DEADLINE);

        let reply = match message {
            Message::Version { user_agent, start_height, .. } => {
                info!("🤝 {} is {} at height {}", sender.address(), user_agent, start_height);
                Some(Message::Verack)
            }
            Message::Ping { nonce } => Some(Message::Pong { nonce }),
            Message::Verack | Message::Pong { .. } => None,
            Message::Custom { command, payload } => {
                debug!("{} sent {} ({} bytes)", sender.address(), command, payload.len());
                None
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = sender.send(reply) {
                warn!("Cannot reply to {}: {}", sender.address(), e);
            }
        }
    }
}
