use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use poi_explorer::viewer::loader::{load_map_data, DataLocations, FsFetcher};
use poi_explorer::viewer::scene::MapScene;
use poi_explorer::{assignments, config, data, prepare, server, sets};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the participant pages and the map viewer
    Serve,
    /// Categorize raw POIs and keep the ones inside the area of interest
    Prepare {
        #[arg(long, value_name = "FILE")]
        pois: PathBuf,
        /// Area of interest, defaults to the configured one
        #[arg(long, value_name = "FILE")]
        area: Option<PathBuf>,
        /// CSV whose first column lists names to drop
        #[arg(long, value_name = "FILE")]
        banned: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Sample per-profile POI sets from prepared POIs
    GenerateSets {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Defaults to the configured sets directory
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Drop every participant assignment
    ResetDb,
    /// Run the map loader against local files and print the resulting scene
    Preview {
        #[arg(long, value_name = "FILE")]
        pois: PathBuf,
        #[arg(long, value_name = "FILE")]
        area: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let app_config = config::AppConfig::load_from_file(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            info!("Serving {} with config {:?}", app_config.location, cli.config);
            server::start_server(app_config).await?;
        }
        Commands::Prepare { pois, area, banned, out } => {
            let area = area.unwrap_or_else(|| app_config.data.static_dir.join(&app_config.data.area_path));
            let index = prepare::build_area_index(&data::load_collection(&area)?)?;
            let banned = match banned {
                Some(path) => prepare::load_banned_names(&path)?,
                None => HashSet::new(),
            };

            let raw = data::load_collection(&pois)?;
            let (kept, summary) = prepare::prepare_pois(raw, &app_config.prepare, &index, &banned);
            data::write_collection(&out, &kept)?;
            info!("Kept {} of {} POIs, written to {:?}", summary.kept, summary.input, out);
        }
        Commands::GenerateSets { input, out, count, seed } => {
            let out = out.unwrap_or_else(|| app_config.sets_root());
            let pois = data::collection_to_pois(&data::load_collection(&input)?);
            let reports = sets::generate_sets(&pois, &app_config.profiles, count, &out, seed)?;
            for report in reports {
                info!(
                    "{}: {} sets written, {} skipped, {} short",
                    report.profile, report.written, report.skipped, report.shortfalls
                );
            }
        }
        Commands::ResetDb => {
            let store = assignments::AssignmentStore::open(&app_config.data.db_path).await?;
            store.reset().await?;
        }
        Commands::Preview { pois, area } => {
            let area = area.unwrap_or_else(|| app_config.data.static_dir.join(&app_config.data.area_path));
            let absolute = |p: &PathBuf| {
                std::fs::canonicalize(p)
                    .with_context(|| format!("Failed to resolve {:?}", p))
                    .map(|p| p.to_string_lossy().into_owned())
            };
            let locations = DataLocations {
                pois: absolute(&pois)?,
                area: absolute(&area).unwrap_or_else(|_| area.to_string_lossy().into_owned()),
            };
            let mut scene = MapScene::new(app_config.viewer.toggle);
            let fetcher = FsFetcher::new("/");
            if let Err(e) = load_map_data(&fetcher, &mut scene, &locations).await {
                info!("Scene has an error banner: {}", e);
            }
            let json = serde_json::to_string_pretty(&serde_json::json!({
                "scene": &scene,
                "controls": scene.controls(),
            }))
            .context("Failed to serialize scene")?;
            println!("{}", json);
        }
    }

    Ok(())
}
