use anyhow::Result;
use clap::Parser;
use saferoute_cli::ConfigOverrides;
use saferoute_cli::NavigateArgs;
use saferoute_cli::SafeRouteConfig;
use saferoute_cli::TimelapseArgs;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// SafeRoute: risk-aware navigation and historical incident data.
///
/// Settings are read from `$SAFEROUTE_HOME/config.toml` (default
/// `~/.saferoute`). Set `RUST_LOG` for more detailed logs on stderr.
#[derive(Debug, Parser)]
#[command(name = "saferoute", version)]
struct Cli {
    /// Base URL of the HTTP API. Overrides `api_base_url`.
    #[arg(long = "api-url", global = true)]
    api_url: Option<String>,

    /// URL of the navigation event server. Overrides `socket_url`.
    #[arg(long = "socket-url", global = true)]
    socket_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Show month-weighted incident data around a point.
    Timelapse(TimelapseArgs),

    /// Choose a route and follow live navigation updates.
    Navigate(NavigateArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("saferoute=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = SafeRouteConfig::load(ConfigOverrides {
        api_base_url: cli.api_url,
        socket_url: cli.socket_url,
    })?;

    // The event channel is `!Send`; everything runs on this thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        match cli.command {
            Command::Timelapse(args) => args.run(&config).await,
            Command::Navigate(args) => args.run(&config).await,
        }
    })
}
