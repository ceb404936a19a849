use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use memmap2::{Mmap, MmapOptions};
use rootcause::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fpmunpack::export::emit_textures;
use fpmunpack::export::gltf_export::{ModelExportOptions, export_model_glb};
use fpmunpack::export::texture::PngDirectorySink;
use fpmunpack::models::fpm::{FPM_MAGIC, parse_fpm};
use fpmunpack::textures::fsh::{FSH_MAGIC, parse_fsh};

/// Decode FPM model and FSH texture containers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log decoder traversal details
    #[clap(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a model container to GLB
    Model {
        /// Model file (.fpm). Textures are loaded from the same directory.
        file: PathBuf,

        /// Output path. Defaults to the input path with a `.glb` extension.
        #[clap(short, long)]
        out: Option<PathBuf>,

        /// Leave out lightmap (`lm_*`) textures and their shapes
        #[clap(long)]
        no_lightmaps: bool,

        /// Opacity applied to lightmap textures
        #[clap(long, default_value_t = 0.5)]
        lightmap_alpha: f32,
    },
    /// Convert every texture container entry to PNG
    Texture {
        /// Texture file (.fsh)
        file: PathBuf,

        /// Output directory. Defaults to the input file's directory.
        #[clap(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the parsed container structure as JSON
    Info {
        /// Model or texture container
        file: PathBuf,
    },
}

fn map_file(path: &Path) -> Result<Mmap, Report> {
    let file =
        File::open(path).context_with(|| format!("Failed to open {}", path.display()))?;
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .context_with(|| format!("Failed to map {}", path.display()))?;
    Ok(mmap)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn run_model(
    file: &Path,
    out: Option<PathBuf>,
    options: &ModelExportOptions,
) -> Result<(), Report> {
    let data = map_file(file)?;
    let fpm = parse_fpm(&data)
        .map_err(|e| rootcause::report!("Failed to parse {}: {e}", file.display()))?;

    let out = out.unwrap_or_else(|| file.with_extension("glb"));
    let mut writer = BufWriter::new(
        File::create(&out).context_with(|| format!("Failed to create {}", out.display()))?,
    );
    let summary = export_model_glb(&fpm, &parent_dir(file), options, &mut writer)
        .context("Failed to export GLB")?;

    info!(
        out = %out.display(),
        shapes = summary.shapes_emitted,
        skipped = summary.shapes_skipped,
        failed = summary.failures.len(),
        "wrote model"
    );
    Ok(())
}

fn run_texture(file: &Path, out_dir: Option<PathBuf>) -> Result<(), Report> {
    let data = map_file(file)?;
    let fsh = parse_fsh(&data)
        .map_err(|e| rootcause::report!("Failed to parse {}: {e}", file.display()))?;

    let out_dir = out_dir.unwrap_or_else(|| parent_dir(file));
    std::fs::create_dir_all(&out_dir)
        .context_with(|| format!("Failed to create {}", out_dir.display()))?;

    let mut sink = PngDirectorySink::new(&out_dir);
    let failures = emit_textures(&fsh, &mut sink).context("Failed to write texture")?;
    info!(
        written = sink.written().len(),
        failed = failures.len(),
        "converted textures"
    );

    if !failures.is_empty() {
        for failure in &failures {
            warn!(name = %failure.name, error = %failure.error, "entry not converted");
        }
        bail!(
            "{} of {} entries failed to decode",
            failures.len(),
            fsh.directory.len()
        );
    }
    Ok(())
}

fn run_info(file: &Path) -> Result<(), Report> {
    let data = map_file(file)?;
    let magic = data
        .get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| rootcause::report!("{} is too short to identify", file.display()))?;

    let json = match magic {
        FPM_MAGIC => {
            let fpm = parse_fpm(&data).map_err(|e| rootcause::report!("{e}"))?;
            serde_json::to_string_pretty(&fpm)?
        }
        FSH_MAGIC => {
            let fsh = parse_fsh(&data).map_err(|e| rootcause::report!("{e}"))?;
            let entries: Vec<_> = fsh
                .entries()
                .map(|(entry, image)| match image {
                    Ok(image) => serde_json::json!({
                        "name": entry.name,
                        "offset": entry.offset,
                        "format": image.format,
                        "metadata": image.metadata,
                        "label": image.label,
                    }),
                    Err(e) => serde_json::json!({
                        "name": entry.name,
                        "offset": entry.offset,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            serde_json::to_string_pretty(&serde_json::json!({
                "header": fsh.header,
                "entries": entries,
            }))?
        }
        _ => bail!("{}: unrecognized magic {magic:#010X}", file.display()),
    };

    println!("{json}");
    Ok(())
}

fn main() -> Result<(), Report> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Model {
            file,
            out,
            no_lightmaps,
            lightmap_alpha,
        } => {
            let options = ModelExportOptions::builder()
                .lightmaps(!no_lightmaps)
                .lightmap_alpha(lightmap_alpha)
                .build();
            run_model(&file, out, &options)
        }
        Command::Texture { file, out_dir } => run_texture(&file, out_dir),
        Command::Info { file } => run_info(&file),
    }
}
