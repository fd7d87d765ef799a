use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use geo_sync::cli::locations::{run, LocationCommand, LocationSyncConfig};
use geo_sync::config::WardScope;
use geo_sync::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "geo-sync",
    version,
    about = "Mirror provinces, districts and wards from the public API into Postgres"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,
    /// Upstream API base URL (default: env GEO_SYNC_API_BASE_URL or the public API)
    #[arg(long, global = true)]
    api_base_url: Option<String>,
    /// Pause after every upstream call, in milliseconds
    #[arg(long, global = true)]
    request_delay_ms: Option<u64>,
    /// Districts with fewer wards than this count as incomplete
    #[arg(long, global = true)]
    ward_threshold: Option<u32>,
    /// Which provinces get their wards fetched (used by `full`)
    #[arg(long, global = true, value_enum)]
    ward_scope: Option<WardScope>,
    /// Optional override for max pool connections
    #[arg(long, global = true)]
    max_connections: Option<u32>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Provinces, then districts per province, then wards per district
    Full,
    /// Refresh the province table only
    Provinces,
    /// Compare live table counts with the stored sync metadata
    Verify,
    /// Fetch wards only for districts below the ward threshold
    SyncRemaining,
    /// Print per-province coverage and the districts still needing wards
    Coverage,
}

#[tokio::main]
async fn main() -> Result<()> {
    geo_sync::util::env::init_env();
    init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    let cfg = LocationSyncConfig {
        database_url: cli.common.db_url,
        api_base_url: cli.common.api_base_url,
        ward_scope: cli.common.ward_scope,
        request_delay_ms: cli.common.request_delay_ms,
        ward_threshold: cli.common.ward_threshold,
        max_connections: cli.common.max_connections,
    };
    let command = match cli.command {
        Commands::Full => LocationCommand::Full,
        Commands::Provinces => LocationCommand::Provinces,
        Commands::Verify => LocationCommand::Verify,
        Commands::SyncRemaining => LocationCommand::SyncRemaining,
        Commands::Coverage => LocationCommand::Coverage,
    };

    if !run(command, cfg).await? {
        tracing::error!("run halted before verification");
        std::process::exit(2);
    }
    Ok(())
}
