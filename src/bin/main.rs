//! Classic Importer CLI
//!
//! Inspect and convert classic Geo/Lif models and BIG archives.

use clap::{Args, Parser, Subcommand};
use classic_importer::source::{AssetSource, BigArchive};
use classic_importer::{ByteOrder, ImportConfig, Importer, ModelCache, ObjExport};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "classic-importer")]
#[command(author, version, about = "Convert classic Geo/Lif models", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data root directory (defaults to $HWC_DATA)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// BIG archive searched before the data root (repeatable)
    #[arg(short, long)]
    archive: Vec<PathBuf>,

    /// Texture list used to resolve shared textures (e.g. "textures.ll")
    #[arg(long)]
    texture_list: Option<String>,

    /// Decode big-endian assets
    #[arg(long)]
    big_endian: bool,

    /// Split packed texture sheets
    #[arg(long)]
    split_textures: bool,

    /// Do not fix known-bad asset data
    #[arg(long)]
    no_patches: bool,

    /// Fail when the model file is missing instead of loading it empty
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node, mesh, material and texture counts of a model
    Info {
        /// Model path relative to the data root (e.g. "R1/Scout/Rl0/LOD0/Scout.peo")
        model: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Export a model as OBJ + MTL + PNG textures
    Export {
        /// Model path relative to the data root
        model: String,

        /// Output file path (without extension)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Dump the textures of a model as PNG files
    Textures {
        /// Model path relative to the data root
        model: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Inspect a BIG archive
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },
}

#[derive(Subcommand)]
enum ArchiveCommands {
    /// List the files of an archive
    List {
        /// Archive file
        archive: PathBuf,
    },

    /// Extract one file from an archive
    Extract {
        /// Archive file
        archive: PathBuf,

        /// Path of the file inside the archive
        path: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { model, source } => {
            show_model_info(&model, &source)?;
        }
        Commands::Export {
            model,
            output,
            source,
        } => {
            export_model(&model, &output, &source)?;
        }
        Commands::Textures {
            model,
            output,
            source,
        } => {
            dump_textures(&model, &output, &source)?;
        }
        Commands::Archive { command } => match command {
            ArchiveCommands::List { archive } => list_archive(&archive)?,
            ArchiveCommands::Extract {
                archive,
                path,
                output,
            } => extract_from_archive(&archive, &path, &output)?,
        },
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &SourceArgs) -> Result<ImportConfig, Box<dyn std::error::Error>> {
    let mut config = match (&args.config, &args.data) {
        (Some(path), _) => ImportConfig::from_json_file(path)?,
        (None, Some(data)) => ImportConfig::new(data),
        (None, None) => ImportConfig::from_env()?,
    };

    if let Some(data) = &args.data {
        config = config.with_data_root(data);
    }
    for archive in &args.archive {
        config = config.with_archive(archive);
    }
    if let Some(list) = &args.texture_list {
        config = config.with_texture_list(list);
    }
    if args.big_endian {
        config = config.with_endian(ByteOrder::Big);
    }
    if args.split_textures {
        config = config.with_split_textures(true);
    }
    if args.no_patches {
        config = config.with_patches(false);
    }
    if args.strict {
        config = config.with_strict(true);
    }
    Ok(config)
}

fn load_model(
    model: &str,
    args: &SourceArgs,
) -> Result<(ModelCache, u32), Box<dyn std::error::Error>> {
    let config = build_config(args)?;
    println!("Loading {} from {:?}...", model, config.data_root);
    let importer = Importer::from_config(config)?;

    let mut cache = ModelCache::new();
    let index = cache.load_classic_model(&importer, model)?;
    Ok((cache, index))
}

/// Output name derived from a model path: its file stem, lowercased.
fn model_name(model: &str) -> String {
    let file = model.rsplit(['/', '\\']).next().unwrap_or(model);
    let stem = file.split('.').next().unwrap_or(file);
    stem.to_ascii_lowercase()
}

fn show_model_info(model: &str, args: &SourceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (cache, index) = load_model(model, args)?;
    let Some(loaded) = cache.model(index) else {
        return Ok(());
    };

    println!("Model: {}", model);
    println!("  Nodes: {}", loaded.nodes.len());
    println!("  Meshes: {}", loaded.meshes.len());
    println!("  Vertices: {}", loaded.vertex_count());
    println!("  Triangles: {}", loaded.vertex_count() / 3);
    println!("  Materials: {}", cache.materials.len());
    println!("  Textures: {} (including default)", cache.textures.len());

    for (i, texture) in cache.textures.iter().enumerate().skip(1) {
        println!(
            "    [{}] {}x{}{}",
            i,
            texture.width(),
            texture.height(),
            if texture.has_alpha { " alpha" } else { "" }
        );
    }

    if let Some(bounds) = loaded.bounds(&cache.vertices) {
        let d = bounds.dimensions();
        println!("  Bounds: {:?} .. {:?}", bounds.min, bounds.max);
        println!("  Dimensions: {:.2} x {:.2} x {:.2}", d[0], d[1], d[2]);
    }

    println!("  Hierarchy:");
    for (i, node) in loaded.nodes.iter().enumerate() {
        let meshes = loaded.meshes.iter().filter(|m| m.node as usize == i).count();
        println!(
            "    {}node {} ({} meshes){}",
            "  ".repeat(loaded.depth(i as u32)),
            i,
            meshes,
            node.parent.map(|p| format!(" parent {}", p)).unwrap_or_default()
        );
    }

    Ok(())
}

fn export_model(
    model: &str,
    output_path: &Path,
    args: &SourceArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (cache, index) = load_model(model, args)?;

    let name = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| model_name(model));
    let dir = output_path.parent().unwrap_or(Path::new("."));
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }

    let export = ObjExport::from_cache(&cache, index, &name)?;

    let obj_path = dir.join(format!("{}.obj", name));
    let mtl_path = dir.join(format!("{}.mtl", name));
    fs::write(&obj_path, &export.obj)?;
    fs::write(&mtl_path, &export.mtl)?;
    println!("Wrote {:?}", obj_path);
    println!("Wrote {:?}", mtl_path);

    for texture in &export.textures {
        let path = dir.join(&texture.filename);
        fs::write(&path, &texture.png_data)?;
        println!("Wrote {:?}", path);
    }

    Ok(())
}

fn dump_textures(
    model: &str,
    output_dir: &Path,
    args: &SourceArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (cache, _) = load_model(model, args)?;
    fs::create_dir_all(output_dir)?;

    let name = model_name(model);
    for (i, texture) in cache.textures.iter().enumerate().skip(1) {
        let path = output_dir.join(format!("{}_{}.png", name, i));
        fs::write(&path, texture.to_png()?)?;
        println!("Wrote {:?} ({}x{})", path, texture.width(), texture.height());
    }

    Ok(())
}

fn list_archive(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let archive = BigArchive::open(path)?;
    println!("{:?}: {} files", path, archive.len());

    for name in archive.names() {
        if let Some(entry) = archive.entry(name) {
            println!(
                "  {:>10} {:>10} {} {}",
                entry.real_length,
                entry.stored_length,
                if entry.compressed { "lzss" } else { "raw " },
                name
            );
        }
    }

    Ok(())
}

fn extract_from_archive(
    path: &Path,
    file: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let archive = BigArchive::open(path)?;
    let data = archive
        .read(file)?
        .ok_or_else(|| format!("{} is not in {:?}", file, path))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, &data)?;
    println!("Wrote {:?} ({} bytes)", output, data.len());

    Ok(())
}
