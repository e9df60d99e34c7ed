//! permitd: serve the permit broker over HTTP.

use std::process;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use permitd::config::{parse_permits, parse_port};
use permitd::transport::serve;
use permitd::{BrokerConfig, BrokerService, PERMITD_VERSION};

const USAGE: &str = "\
Usage: permitd [--permits <n>] [--host <addr>] [--port <port>] [--await-explicit-shutdown]

Options:
  --permits <n>                Total permits in the pool [env: PERMITD_PERMITS, default: 10]
  --host <addr>                Bind address [env: PERMITD_HOST, default: 0.0.0.0]
  --port <port>                Bind port [env: PERMITD_PORT, default: 5000]
  --await-explicit-shutdown    Ignore SIGTERM; stop on SIGINT or POST /shutdown
  -h, --help                   Print this help";

/// Initialize tracing with PERMITD_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("PERMITD_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!(
            "permitd={level},permitd_server={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

/// Apply command-line flags on top of `config`.
fn parse_args(args: &[String], mut config: BrokerConfig) -> Result<BrokerConfig, String> {
    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--permits" => {
                i += 1;
                let v = args.get(i).ok_or("--permits requires a value")?;
                config.total_permits = parse_permits("--permits", v).map_err(|e| e.to_string())?;
            }
            "--host" => {
                i += 1;
                config.server.host = args.get(i).ok_or("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                let v = args.get(i).ok_or("--port requires a value")?;
                config.server.port = parse_port("--port", v).map_err(|e| e.to_string())?;
            }
            "--await-explicit-shutdown" => config.server.await_explicit_shutdown = true,
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match BrokerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args, config) {
        Ok(c) => c,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            process::exit(if msg.is_empty() { 0 } else { 2 });
        }
    };

    info!("permitd {}", PERMITD_VERSION);

    let service = Arc::new(BrokerService::from_config(&config));
    if let Err(e) = serve(config.server, service).await {
        error!(error = %e, "Server failed");
        process::exit(1);
    }
}
