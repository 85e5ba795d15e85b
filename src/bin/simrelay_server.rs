//! simrelay gRPC Server
//!
//! A standalone server binary exposing the orchestrator over gRPC.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use simrelay::transport::SimRelayServiceImpl;
use simrelay::{OrchestratorConfig, RequestDispatcher};

/// Server configuration
struct Config {
    /// Address to bind to
    addr: SocketAddr,
    /// Orchestrator settings (environment first, then flags)
    orchestrator: OrchestratorConfig,
}

fn parse_value<T: std::str::FromStr>(flag: &str, args: &[String], i: usize) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("error: {flag} requires a value");
        std::process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: invalid value for {flag}: {raw}");
        std::process::exit(1);
    })
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let orchestrator = OrchestratorConfig::from_env().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });
    let mut config = Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 50061)),
        orchestrator,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                let port: u16 = parse_value("--port", &args, i);
                config.addr.set_port(port);
                i += 2;
            }
            "--max-episodes" => {
                config.orchestrator.max_episodes = parse_value("--max-episodes", &args, i);
                i += 2;
            }
            "--agent-timeout-ms" => {
                let ms: u64 = parse_value("--agent-timeout-ms", &args, i);
                config.orchestrator.agent_timeout = Duration::from_millis(ms);
                i += 2;
            }
            "--help" | "-h" => {
                println!("simrelay-server - simulation orchestrator gRPC server");
                println!();
                println!("USAGE:");
                println!("    simrelay-server [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -p, --port <PORT>              Port to listen on [default: 50061]");
                println!("        --max-episodes <N>         Episodes per run [default: 99]");
                println!("        --agent-timeout-ms <MS>    Agent request timeout [default: 30000]");
                println!("    -h, --help                     Print help information");
                println!();
                println!("ENVIRONMENT:");
                println!("    SIMRELAY_MAX_EPISODES, SIMRELAY_AGENT_TIMEOUT_MS, RUST_LOG");
                std::process::exit(0);
            }
            other => {
                eprintln!("error: unknown argument: {other}");
                eprintln!("Run with --help for usage information");
                std::process::exit(1);
            }
        }
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = parse_args();
    let dispatcher = Arc::new(RequestDispatcher::with_config(config.orchestrator)?);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        maps = ?dispatcher.list_maps(),
        addr = %config.addr,
        "starting simrelay server"
    );

    let svc = SimRelayServiceImpl::new(Arc::clone(&dispatcher)).into_server();

    Server::builder()
        .add_service(svc)
        .serve_with_shutdown(config.addr, async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    let final_status = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await?;
    tracing::info!(status = ?final_status.code, "shut down");
    Ok(())
}
