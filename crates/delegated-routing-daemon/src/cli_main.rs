//! Command-line client for delegated routing services.
//!
//! Run:
//!   routing identify
//!   routing find-providers bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy --limit 5
//!   routing --endpoint http://127.0.0.1:8190/ get-ipns 12D3KooW...

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use delegated_routing_client::{
    CancellationToken, ClientConfig, ContentRoutingClient, DelegatedRoutingClient, Placement,
    RequiredProtocol, with_deadline,
};
use delegated_routing_core::codec::BASE64;
use delegated_routing_core::{AddrInfo, Cid, Multiaddr, PeerId};
use libp2p_identity::Keypair;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "routing", version, about = "Delegated routing client")]
struct Cli {
    /// Routing service endpoint
    #[arg(long, env = "ROUTING_ENDPOINT", default_value = "http://127.0.0.1:8190/")]
    endpoint: String,

    /// Request placement: body or query
    #[arg(long, default_value = "body")]
    placement: Placement,

    /// Transfer protocol providers must support (bitswap, graphsync-filecoin-v1, none)
    #[arg(long, default_value = "bitswap")]
    protocol: RequiredProtocol,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the methods the service answers
    Identify,

    /// Print providers of a key, one JSON object per line
    FindProviders {
        key: Cid,

        /// Stop after this many peers; 0 for all
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },

    /// Print the naming records of a peer, base64-encoded
    GetIpns { peer: PeerId },

    /// Store a base64-encoded naming record for a peer
    PutIpns { peer: PeerId, record: Record },

    /// Announce that this node provides the given keys
    Provide {
        #[arg(required = true)]
        keys: Vec<Cid>,

        /// Protobuf-encoded keypair; a fresh ed25519 key is used when omitted
        #[arg(long)]
        key_file: Option<PathBuf>,

        /// Addresses to announce
        #[arg(long = "addr")]
        addrs: Vec<Multiaddr>,

        /// Requested announcement lifetime
        #[arg(long, default_value_t = 24 * 60 * 60)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("routing=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        placement: cli.placement,
        required_protocol: cli.protocol,
        ..ClientConfig::new(cli.endpoint.clone())
    };
    let mut builder = DelegatedRoutingClient::builder_from_config(&config);
    if let Command::Provide {
        key_file, addrs, ..
    } = &cli.command
    {
        let keypair = load_keypair(key_file.as_deref())?;
        let identity = AddrInfo::new(keypair.public().to_peer_id(), addrs.clone());
        eprintln!("announcing as {}", identity.id);
        builder = builder.provide_identity(identity, keypair);
    }
    let client = builder.build().context("building client")?;

    let root = CancellationToken::new();
    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let timeout = Duration::from_secs(cli.timeout_secs);
    let client = &client;
    let command = cli.command;
    with_deadline(&root, timeout, |cancel| async move {
        match command {
            Command::Identify => {
                for method in client.identify(&cancel).await? {
                    println!("{method}");
                }
            }
            Command::FindProviders { key, limit } => {
                let routing = ContentRoutingClient::new(client.clone());
                let mut peers = routing.find_providers_async(&cancel, key, limit).await;
                while let Some(info) = peers.recv().await {
                    println!("{}", peer_json(&info));
                }
            }
            Command::GetIpns { peer } => {
                for record in client.get_ipns(&cancel, peer.to_bytes()).await? {
                    println!("{}", BASE64.encode(record));
                }
            }
            Command::PutIpns { peer, record } => {
                client.put_ipns(&cancel, peer.to_bytes(), record.0).await?;
            }
            Command::Provide { keys, ttl_secs, .. } => {
                let granted = client
                    .provide(&cancel, keys, Duration::from_secs(ttl_secs))
                    .await?;
                match granted {
                    Some(ttl) => println!("granted for {}s", ttl.as_secs()),
                    None => println!("no answer from service"),
                }
            }
        }
        Ok(())
    })
    .await?;
    Ok(())
}

/// Record bytes given base64-encoded on the command line.
#[derive(Clone)]
struct Record(Vec<u8>);

impl FromStr for Record {
    type Err = base64::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BASE64.decode(s.trim()).map(Record)
    }
}

fn peer_json(info: &AddrInfo) -> serde_json::Value {
    serde_json::json!({
        "id": info.id.to_string(),
        "addrs": info.addrs.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

fn load_keypair(path: Option<&std::path::Path>) -> Result<Keypair> {
    let Some(path) = path else {
        return Ok(Keypair::generate_ed25519());
    };
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Keypair::from_protobuf_encoding(&bytes).context("decoding keypair")
}
