//! nowcast: now-playing presence bridge runtime binary.
//! Single-process binary embedding the presence host, the control
//! client, and the deep-link handler.

use clap::Parser;

mod cli;
mod client;
mod host;
mod open;
mod register;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let config_path = args.config.clone().unwrap_or_else(cli::default_config_path);

    // Top-level flags short-circuit the subcommands.
    if args.register_uri {
        let path = register::register_uri_scheme()?;
        println!("URI scheme handler written to {}", path.display());
        return Ok(());
    }
    if args.clear {
        let cfg = cli::load_config(&config_path)?;
        host::clear_once(&cfg).await?;
        return Ok(());
    }

    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Host(cli::HostOpts::default()));

    match command {
        cli::Command::Host(opts) => {
            let filter = std::env::var("NOWCAST_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("nowcast host starting");

            let mut cfg = cli::load_config(&config_path)?;
            if let Some(interval) = opts.poll_interval_ms {
                cfg.poll_interval_ms = interval;
                cfg.validate()?;
            }
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            host::run_host(cfg, &socket_path).await?;
        }
        cli::Command::Open(opts) => {
            // Deep links must resolve even without a config file; the
            // web-search fallback needs nothing from it.
            let cfg = cli::load_config_or_default(&config_path)?;
            open::cmd_open(&cfg, &opts.uri).await?;
        }
        cli::Command::Status => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_status(&socket_path).await?;
        }
        cli::Command::Pause => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_control(&socket_path, "pause").await?;
        }
        cli::Command::Resume => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_control(&socket_path, "resume").await?;
        }
        cli::Command::Clear => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_control(&socket_path, "clear").await?;
        }
        cli::Command::Stop => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_control(&socket_path, "stop").await?;
        }
    }

    Ok(())
}
