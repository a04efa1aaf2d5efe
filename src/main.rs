//! i3dexporter CLI
//!
//! Command-line front end for exporting scene descriptions to GIANTS I3D
//! documents and for inspecting the files the exporter produces.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use i3d_core::{ExportConfig, GeometryEncoding, PathMode};
use i3d_export::{read_shapes_file, ExportReport, I3dExporter};
use i3d_scene::logging::{init_with_config, TracingConfig};
use i3d_scene::{SceneDescription, SceneSource, ShaderLibrary};

/// i3dexporter - scene graph to GIANTS I3D exporter
#[derive(Parser)]
#[command(name = "i3dexporter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for reports
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene description to an .i3d document
    Export(ExportArgs),

    /// Show information about a scene description or a .shapes file
    Inspect(InspectArgs),

    /// List the shader templates found in a directory
    Shaders(ShadersArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Scene description (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output .i3d path
    #[arg(short, long)]
    output: PathBuf,

    /// Export configuration (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with shader templates for custom parameter defaults
    #[arg(long)]
    shaders: Option<PathBuf>,

    /// Write geometry into a binary .shapes file
    #[arg(long)]
    binary: bool,

    /// Game install directory for $data paths
    #[arg(long)]
    install_root: Option<PathBuf>,

    /// Path mode: absolute, document, install
    #[arg(long)]
    path_mode: Option<String>,
}

#[derive(Args)]
struct InspectArgs {
    /// Path to a scene description or .shapes file
    path: PathBuf,
}

#[derive(Args)]
struct ShadersArgs {
    /// Directory containing shader XML templates
    path: PathBuf,
}

fn parse_path_mode(value: &str) -> Result<PathMode> {
    match value.to_lowercase().as_str() {
        "absolute" => Ok(PathMode::Absolute),
        "document" | "relative" => Ok(PathMode::RelativeToDocument),
        "install" | "data" => Ok(PathMode::RelativeToInstall),
        _ => bail!("Unknown path mode: {}", value),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_with_config(TracingConfig::for_verbosity(cli.verbose));

    match cli.command {
        Commands::Export(args) => cmd_export(args, cli.format),
        Commands::Inspect(args) => cmd_inspect(args, cli.format),
        Commands::Shaders(args) => cmd_shaders(args, cli.format),
    }
}

fn cmd_export(args: ExportArgs, format: OutputFormat) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ExportConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => ExportConfig::default(),
    };
    if args.binary {
        config.geometry_encoding = GeometryEncoding::Binary;
    }
    if let Some(root) = args.install_root {
        config.install_root = Some(root);
    }
    if let Some(mode) = &args.path_mode {
        config.path_mode = parse_path_mode(mode)?;
    }

    let scene = SceneDescription::from_json_file(&args.input)
        .with_context(|| format!("Failed to read scene {:?}", args.input))?;

    let library = match &args.shaders {
        Some(dir) => ShaderLibrary::load_dir(dir)
            .with_context(|| format!("Failed to load shaders from {:?}", dir))?,
        None => ShaderLibrary::new(),
    };

    let mut exporter = I3dExporter::new(config)?.with_shader_library(library);
    if let Some(dir) = args.input.parent().filter(|d| !d.as_os_str().is_empty()) {
        exporter = exporter.with_source_dir(fs::canonicalize(dir)?);
    }

    let report = exporter.export(&scene, &args.output).context("Export failed")?;
    print_report(&report, format)
}

fn print_report(report: &ExportReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => {
            println!("{}", report.summary());
            if report.has_issues() {
                warn!("Export finished with issues");
            }
        }
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let path = &args.path;
    if !path.exists() {
        bail!("File not found: {:?}", path);
    }

    let is_shapes = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("shapes"))
        .unwrap_or(false);

    if is_shapes {
        let bytes = fs::read(path)?;
        let shapes = read_shapes_file(&bytes).context("Failed to decode shapes file")?;
        info!("Decoded {} shapes", shapes.len());
        match format {
            OutputFormat::Json => {
                let entries: Vec<_> = shapes
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "shape_id": s.shape_id,
                            "name": s.name,
                            "vertices": s.positions.len(),
                            "triangles": s.indices.len() / 3,
                            "subsets": s.subsets.len(),
                            "skinned": s.skin.is_some(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Text => {
                println!("{:>6}  {:<32} {:>10} {:>10} {:>7}", "id", "name", "vertices", "triangles", "subsets");
                for s in &shapes {
                    println!(
                        "{:>6}  {:<32} {:>10} {:>10} {:>7}{}",
                        s.shape_id,
                        s.name,
                        s.positions.len(),
                        s.indices.len() / 3,
                        s.subsets.len(),
                        if s.skin.is_some() { "  skinned" } else { "" }
                    );
                }
            }
        }
        return Ok(());
    }

    let scene = SceneDescription::from_json_file(path)
        .with_context(|| format!("Failed to read scene {:?}", path))?;
    let exporter = I3dExporter::new(ExportConfig::default())?;
    let mut report = ExportReport::new();
    exporter.build_graph(&scene, &mut report)?;
    report.nodes.retain(|n| n.exported);

    match format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => {
            println!("Scene: {} ({} fps)", scene.scene_name(), scene.frames_per_second());
            for node in &report.nodes {
                println!("{:>5}  {:<12} {:<16} {}", node.id, node.path, node.kind, node.name);
            }
            println!("{}", report.summary());
        }
    }
    Ok(())
}

fn cmd_shaders(args: ShadersArgs, format: OutputFormat) -> Result<()> {
    let library = ShaderLibrary::load_dir(&args.path)
        .with_context(|| format!("Failed to load shaders from {:?}", args.path))?;

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = library
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "id": t.id,
                        "path": t.path,
                        "parameters": t.parameters.iter().map(|p| &p.name).collect::<Vec<_>>(),
                        "textures": t.textures.iter().map(|p| &p.name).collect::<Vec<_>>(),
                        "variations": t.variations,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            for template in library.iter() {
                println!(
                    "{:<32} {:>3} parameters, {:>3} textures, {:>3} variations",
                    template.id,
                    template.parameters.len(),
                    template.textures.len(),
                    template.variations.len()
                );
            }
        }
    }
    Ok(())
}
