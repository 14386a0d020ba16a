//! Controller configuration service.
//!
//! # Architecture Overview
//!
//! ```text
//!   CONTROLLER_HOME / -D controller.home        CONTROLLER_EX_HOME / -D controller.ex_home
//!                  │                                            │
//!                  ▼                                            ▼
//!          ┌──────────────┐                            ┌──────────────┐
//!          │ primary root │                            │ extended root│
//!          └──────┬───────┘                            └──────┬───────┘
//!                 └──────────────┬─────────────────────────────┘
//!                                ▼
//!                     ┌─────────────────────┐        ┌──────────────────┐
//!                     │   ConfigRegistry    │◀───────│ ReloadCoordinator│
//!                     │ internal/controller │        │  3 × watchdog    │
//!                     │ cluster/ldap/db     │        └──────────────────┘
//!                     └──────────┬──────────┘
//!                                │ monitor port
//!                                ▼
//!                     ┌─────────────────────┐
//!                     │    MonitorProbe     │──── bounded workers ───▶ remote agent
//!                     └─────────────────────┘
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use controller_config::config::{AppNames, ConfigRegistry, PathResolver, ProcessProperties};
use controller_config::lifecycle::{bootstrap, shutdown_runtime, signals};
use controller_config::observability::init_logging;
use controller_config::probe::{JsonLineConnector, MonitorProbe, PortSource, ProbeSettings};

#[derive(Parser)]
#[command(name = "controller-config")]
#[command(about = "Runtime configuration and live reload for the controller", long_about = None)]
struct Cli {
    /// Application name used for environment variables and default roots
    #[arg(long, default_value = "controller")]
    app_name: String,

    /// Process property, e.g. -D controller.port=8080
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = ProcessProperties::parse_define)]
    defines: Vec<(String, String)>,

    /// Watchdog poll interval
    #[arg(long, default_value_t = 2000)]
    poll_interval_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and keep it in sync until interrupted
    Run,
    /// Print the resolved configuration as JSON
    Show,
    /// Fetch the status of a remote monitoring agent
    Probe {
        /// Agent address, `host` or `host:port`
        address: String,

        #[arg(long, default_value_t = 3000)]
        timeout_ms: u64,

        #[arg(long, default_value_t = 16)]
        workers: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(run(cli));
    // A probe worker that missed its deadline may still be blocked in I/O.
    shutdown_runtime(runtime);
    result
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let logging = init_logging();

    let properties: ProcessProperties = cli.defines.into_iter().collect();
    let resolver = PathResolver::from_process(AppNames::new(cli.app_name), properties);

    match cli.command {
        Commands::Run => {
            let service = bootstrap(&resolver, Duration::from_millis(cli.poll_interval_ms), Some(logging))?;
            tracing::info!(
                home = %service.registry().home().path().display(),
                "Watching configuration, press Ctrl-C to stop"
            );

            let signal = signals::wait_for_signal().await?;
            tracing::info!(signal, "Shutdown signal received");
            service.shutdown().await;
        }
        Commands::Show => {
            let registry = ConfigRegistry::init(&resolver)?;
            println!("{}", serde_json::to_string_pretty(&describe(&registry))?);
        }
        Commands::Probe {
            address,
            timeout_ms,
            workers,
        } => {
            let registry = std::sync::Arc::new(ConfigRegistry::init(&resolver)?);
            let probe = MonitorProbe::new(
                JsonLineConnector::default(),
                PortSource::Registry(registry),
                ProbeSettings {
                    workers,
                    deadline: Duration::from_millis(timeout_ms),
                },
            );
            let result = probe.status(&address).await;
            println!("{}", serde_json::to_string_pretty(&result.envelope())?);
            probe.close(&address);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn describe(registry: &ConfigRegistry) -> serde_json::Value {
    let settings = registry.settings();
    let announcement = registry.announcement();
    json!({
        "version": registry.version(),
        "home": registry.home(),
        "exHome": registry.ex_home(),
        "clustered": registry.is_clustered(),
        "identity": registry.current_identity(),
        "devMode": registry.is_dev_mode(),
        "securityEnabled": registry.is_security_enabled(),
        "announcement": announcement.text,
        "settings": &*settings,
        "database": registry.database_properties(),
    })
}
