use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "nodepack",
    about = "nodepack: plan the nodes pending pods need",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack the scenario's pods onto prospective nodes
    Solve {
        /// Scenario file
        #[arg(short, long, default_value = "nodepack.toml")]
        file: String,
        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
        /// Append solver metrics in Prometheus text format
        #[arg(long)]
        metrics: bool,
    },
    /// List the scenario's instance types, cheapest first
    Catalog {
        #[arg(short, long, default_value = "nodepack.toml")]
        file: String,
    },
    /// Parse and validate a scenario file without solving
    Check {
        #[arg(short, long, default_value = "nodepack.toml")]
        file: String,
    },
    /// Write a starter scenario file
    Init {
        #[arg(short, long, default_value = "nodepack.toml")]
        file: String,
        /// Provisioner name to put in the scaffold
        #[arg(long, default_value = "default")]
        provisioner: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nodepack=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Solve { file, format, metrics } => commands::solve::solve(&file, &format, metrics),
        Commands::Catalog { file } => commands::catalog::catalog(&file),
        Commands::Check { file } => commands::check::check(&file),
        Commands::Init { file, provisioner, force } => commands::init::init(&file, &provisioner, force),
    }
}
