use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ember_app::{AppConfig, Game};
use ember_assets::{AssetLoader, MeshData};
use ember_render::RecordingDevice;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ember-cli", about = "Headless tools for the ember renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Asset root, overriding `assets.root` from the config
    #[arg(long, global = true)]
    assets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Parse an OBJ file and print its statistics
    Obj {
        /// Path to the .obj file, relative to the asset root unless absolute
        path: PathBuf,
    },
    /// Build the demo scene on a recording device and print the commands
    /// issued for the rendered frames
    Trace {
        /// Number of frames to render
        #[arg(short, long, default_value = "1")]
        frames: u32,
        /// Print the command list as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Fixed frame step used by `trace`, in seconds.
const TRACE_DT: f32 = 1.0 / 60.0;

/// Load `path` through the configured asset root, returning the full path.
fn load_mesh(config: &AppConfig, path: &Path) -> anyhow::Result<(PathBuf, MeshData)> {
    let assets = AssetLoader::new(&config.assets.root);
    let full = assets.resolve(path);
    let mesh = assets
        .load_obj(path)
        .with_context(|| format!("load {}", full.display()))?;
    Ok((full, mesh))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if let Some(root) = cli.assets {
        config.assets.root = root;
    }

    match cli.command {
        Commands::Info => {
            println!("ember-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("ecs: {}", ember_ecs::crate_info());
            println!("assets: {}", ember_assets::crate_info());
            println!("render: {}", ember_render::crate_info());
            println!("app: {}", ember_app::crate_info());
            println!("asset root: {}", config.assets.root.display());
        }
        Commands::Obj { path } => {
            let (full, mesh) = load_mesh(&config, &path)?;
            println!("{}", full.display());
            println!("  vertices:  {}", mesh.vertex_count());
            println!("  triangles: {}", mesh.triangle_count());
            println!("  indices:   {}", mesh.indices.len());
            let has_uvs = mesh.uvs.iter().any(|uv| *uv != [0.0; 2]);
            let has_normals = mesh.normals.iter().any(|n| *n != [0.0; 3]);
            println!("  uvs:       {}", if has_uvs { "yes" } else { "no" });
            println!("  normals:   {}", if has_normals { "yes" } else { "no" });
        }
        Commands::Trace { frames, json } => {
            let mut device = RecordingDevice::new();
            let assets = AssetLoader::new(&config.assets.root);
            let mut game =
                Game::init(&mut device, &assets, config.scene).context("build scene")?;
            device.clear_commands();
            tracing::info!(frames, root = %config.assets.root.display(), "tracing frames");

            let mut drawn = 0;
            let mut skipped = Vec::new();
            for _ in 0..frames {
                let report = game.update(&mut device, TRACE_DT)?;
                drawn += report.drawn;
                skipped.extend(report.skipped);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(device.commands())?);
            } else {
                for command in device.commands() {
                    println!("{command:?}");
                }
                println!(
                    "frames: {}, draws: {drawn}, skipped: {}",
                    game.frames(),
                    skipped.len()
                );
                println!(
                    "entities: {}, geometries: {}, materials: {}, textures: {}",
                    game.components().entity_count(),
                    game.scene().geometry_count(),
                    game.scene().material_count(),
                    game.scene().texture_count()
                );
                for skip in &skipped {
                    println!("  skipped {}: {}", skip.entity.short(), skip.reason);
                }
            }
            game.shutdown(&mut device);
        }
    }

    Ok(())
}
