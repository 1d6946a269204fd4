//! Mosh client core CLI entry point.
//!
//! Reads the out-of-band SSH bootstrap line (from stdin, or from a file for
//! testing), opens the roaming UDP session it describes, and pumps
//! keystrokes from stdin to the server while writing host output to
//! stdout. Raw terminal mode, resize detection, and rendering are a UI
//! concern this crate deliberately leaves to its caller (see the crate's
//! scope notes) — this binary is a minimal runnable harness, not a
//! full-featured client.

use std::io::Read as _;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mosh_core::bootstrap::{self, IpResolutionPolicy};
use mosh_core::net::Endpoint;
use mosh_core::session::{MoshSession, SessionOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// How long to wait for a `MOSH CONNECT` line on the bootstrap channel
/// before giving up, per the spec's bootstrap deadline.
const BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug, Clone)]
#[command(name = "mosh-core", about = "Mosh client core transport + terminal")]
struct Args {
    /// Default host to connect to if the bootstrap output doesn't name one
    /// under the selected IP-resolution policy.
    host: String,

    /// Read the bootstrap output from this file instead of stdin (for
    /// testing without an actual SSH session).
    #[arg(long)]
    bootstrap_file: Option<std::path::PathBuf>,

    /// How to pick the connection host from the bootstrap output.
    #[arg(long, value_enum, default_value = "default")]
    ip_policy: IpPolicyArg,

    /// Local UDP port to bind; 0 picks an ephemeral port.
    #[arg(long, default_value_t = 0)]
    local_port: u16,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum IpPolicyArg {
    Default,
    Local,
    Remote,
}

impl From<IpPolicyArg> for IpResolutionPolicy {
    fn from(value: IpPolicyArg) -> Self {
        match value {
            IpPolicyArg::Default => IpResolutionPolicy::Default,
            IpPolicyArg::Local => IpResolutionPolicy::Local,
            IpPolicyArg::Remote => IpResolutionPolicy::Remote,
        }
    }
}

fn read_bootstrap_output(args: &Args) -> Result<String> {
    let mut buf = String::new();
    match &args.bootstrap_file {
        Some(path) => {
            std::fs::File::open(path)
                .with_context(|| format!("failed to open bootstrap file {}", path.display()))?
                .read_to_string(&mut buf)?;
        }
        None => {
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read bootstrap output from stdin")?;
        }
    }
    Ok(buf)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bootstrap_output = tokio::time::timeout(
        BOOTSTRAP_DEADLINE,
        tokio::task::spawn_blocking({
            let args = args.clone();
            move || read_bootstrap_output(&args)
        }),
    )
    .await
    .context("bootstrap channel timed out")??
    .context("failed reading bootstrap output")?;

    let info = bootstrap::parse(&bootstrap_output, &args.host, None, args.ip_policy.into())
        .context("failed to parse bootstrap output")?;

    log::info!("connecting to {}:{}", info.host, info.udp_port);

    let peer_addr: SocketAddr = (info.host.as_str(), info.udp_port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}:{}", info.host, info.udp_port))?
        .next()
        .context("host resolved to no addresses")?;
    let local_addr: SocketAddr = if peer_addr.is_ipv6() {
        format!("[::]:{}", args.local_port)
    } else {
        format!("0.0.0.0:{}", args.local_port)
    }
    .parse()?;

    let endpoint = Endpoint::bind(local_addr, peer_addr).await?;
    let options = SessionOptions::default();
    let mut session = MoshSession::new(&info.key, &options)?;

    for datagram in session.tick(false, true).unwrap_or_default() {
        endpoint.send(&datagram).await?;
    }

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut ticker = tokio::time::interval(mosh_core::ssp::WAKE_INTERVAL);
    let mut stdin_buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (should_retransmit, should_heartbeat) = session.due_flags();
                if let Some(datagrams) = session.tick(should_retransmit, should_heartbeat) {
                    for datagram in datagrams {
                        let _ = endpoint.send(&datagram).await;
                    }
                }
            }
            recv = endpoint.recv() => {
                let Ok((datagram, from)) = recv else { continue };
                if let Some(acks) = session.handle_datagram(&datagram) {
                    endpoint.note_viable_peer(from).await;
                    for ack in acks {
                        let _ = endpoint.send(&ack).await;
                    }
                    if !session.raw_host_output.is_empty() {
                        let _ = stdout.write_all(&session.raw_host_output).await;
                        let _ = stdout.flush().await;
                        session.raw_host_output.clear();
                    }
                }
            }
            read = stdin.read(&mut stdin_buf) => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        for datagram in session.queue_keystrokes(stdin_buf[..n].to_vec()) {
                            let _ = endpoint.send(&datagram).await;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }

    Ok(())
}
