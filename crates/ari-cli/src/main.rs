use std::path::{Path, PathBuf};

use anyhow::Result;
use ari_sync::cities::{self, City};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ari-cli")]
#[command(about = "Credit register ingestion: discover candidates, import them into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch both registers and write scoped candidate files
    Discover(DiscoverArgs),
    /// Upsert a candidate file into the entity graph
    Import(ImportArgs),
}

#[derive(Debug, Clone)]
struct CityList(Vec<&'static City>);

fn parse_cities(value: &str) -> Result<CityList, String> {
    cities::parse_city_list(value)
        .map(CityList)
        .map_err(|err| err.to_string())
}

fn parse_radius(value: &str) -> Result<f64, String> {
    let radius: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if radius.is_finite() && radius > 0.0 {
        Ok(radius)
    } else {
        Err(format!("radius must be a positive number of kilometres, got {value}"))
    }
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    /// Output directory for candidate files and run metadata
    #[arg(long, env = "ARI_OUT_DIR", default_value = "./data/discover")]
    out: PathBuf,
    /// Search radius around each city centre, in km
    #[arg(long, default_value = "80", value_parser = parse_radius)]
    radius: f64,
    /// Comma-separated target cities
    #[arg(long, default_value = cities::DEFAULT_CITIES, value_parser = parse_cities)]
    cities: CityList,
    /// Postcode centroid CSV used to give representatives coordinates
    #[arg(long, env = "ARI_POSTCODE_FILE")]
    postcodes: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Selects `.env.<mode>` ahead of `.env`
    #[arg(long, default_value = ari_import::config::DEFAULT_MODE)]
    mode: String,
    #[arg(long, default_value = "./data/discover/candidates_confirmed.csv")]
    input: PathBuf,
    /// Import only the first N valid rows
    #[arg(long)]
    limit: Option<usize>,
    /// Validate and report without touching the database
    #[arg(long)]
    dry_run: bool,
    /// Apply pending migrations first
    #[arg(long)]
    migrate: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ari=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn discover(args: DiscoverArgs) -> Result<()> {
    dotenvy::dotenv().ok();
    let mut config = ari_sync::DiscoverConfig::from_env();
    config.out_dir = args.out;
    config.radius_km = args.radius;
    config.cities = args.cities.0;
    if args.postcodes.is_some() {
        config.postcode_file = args.postcodes;
    }

    println!(
        "discovering credit intermediaries within {} km of {}",
        config.radius_km,
        config.cities.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
    );
    let summary = ari_sync::run_discover(config).await?;
    println!("{}", ari_sync::render_summary(&summary));
    Ok(())
}

async fn import(args: ImportArgs) -> Result<()> {
    ari_import::load_env_for_mode(Path::new("."), &args.mode);
    let mut config = ari_import::ImportConfig::from_env(args.mode, args.input);
    config.limit = args.limit;
    config.dry_run = args.dry_run;
    config.migrate = args.migrate;
    info!(mode = %config.mode, input = %config.input.display(), dry_run = config.dry_run, "import starting");

    let report = ari_import::run_import(&config).await?;
    println!("{}", report.to_json()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover(args) => discover(args).await?,
        Commands::Import(args) => import(args).await?,
    }

    Ok(())
}
