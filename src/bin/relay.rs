use chrono::Local;
use clap::Parser;
use log::{error, info};
use peercall::config::RelayConfig;
use peercall::relay::RelayServer;
use std::net::SocketAddr;

/// Relay that routes call signaling between connected peers.
///
/// Usage:
///   peercall-relay                          # listen on 127.0.0.1:3536
///   peercall-relay --bind 0.0.0.0:3536      # listen on all interfaces
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:3536")]
    bind: SocketAddr,

    /// Frames queued per peer before the relay starts dropping them.
    #[arg(long, default_value_t = 100)]
    inbox_capacity: usize,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let config = RelayConfig {
            bind_addr: args.bind,
            inbox_capacity: args.inbox_capacity,
        };
        let server = match RelayServer::bind(config).await {
            Ok(server) => server,
            Err(e) => {
                error!("Failed to bind {}: {e}", args.bind);
                return;
            }
        };
        match server.local_addr() {
            Ok(addr) => info!("Relay listening on ws://{addr}"),
            Err(e) => error!("Failed to read listening address: {e}"),
        }

        tokio::select! {
            result = server.run() => {
                if let Err(e) = result {
                    error!("Relay stopped: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
            }
        }
    });
}
