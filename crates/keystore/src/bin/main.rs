use clap::Parser;
use keystore::transport::{HttpServer, TcpServer, UdpServer};
use keystore::{Config, Dispatcher, Store};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "In-memory key/value store over TCP, UDP and HTTP", long_about = None)]
struct Args {
    /// Optional TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address
    #[arg(long)]
    http_addr: Option<String>,

    /// TCP listen address
    #[arg(long)]
    tcp_addr: Option<String>,

    /// UDP listen address
    #[arg(long)]
    udp_addr: Option<String>,

    /// JSON file the store is loaded from and saved to
    #[arg(short, long)]
    data_path: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(addr) = self.http_addr {
            config.server.http_addr = addr;
        }
        if let Some(addr) = self.tcp_addr {
            config.server.tcp_addr = addr;
        }
        if let Some(addr) = self.udp_addr {
            config.server.udp_addr = addr;
        }
        if self.data_path.is_some() {
            config.server.data_path = self.data_path;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    info!("Starting keystore server");

    let store = match &config.server.data_path {
        Some(path) => {
            info!("Persisting values to {:?}", path);
            Store::with_path(path)
        }
        None => Store::new(),
    };

    let (dispatcher, handle) = Dispatcher::new(store, config.limits.request_channel_capacity);
    let dispatcher_task = dispatcher.start();

    let tcp = TcpServer::bind(
        &config.server.tcp_addr,
        handle.requests(),
        config.limits.tcp_max_frame_bytes,
    )
    .await?;
    let udp = UdpServer::bind(
        &config.server.udp_addr,
        handle.requests(),
        config.limits.udp_buffer_size,
    )
    .await?;
    let http = HttpServer::bind(
        &config.server.http_addr,
        handle.requests(),
        config.limits.http_max_body_bytes,
        config.limits.http_timeout(),
    )
    .await?;

    tokio::spawn(async move {
        if let Err(e) = tcp.run().await {
            error!("TCP server error: {}", e);
        }
    });
    tokio::spawn(async move {
        if let Err(e) = udp.run().await {
            error!("UDP server error: {}", e);
        }
    });
    tokio::spawn(async move {
        if let Err(e) = http.run().await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("Keystore server fully initialized and running");
    shutdown_signal().await;

    info!("Shutting down, saving values");
    if let Err(e) = handle.stop().await {
        error!("Dispatcher already stopped: {}", e);
    }
    dispatcher_task.await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
