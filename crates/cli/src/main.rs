use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{DynamicMessage, SchemaRegistry};
use forge::{GeneratedFile, GeneratorConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protodefaults")]
#[command(about = "Declarative default values for protobuf schemas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every defaults rule against the schema.
    Check {
        /// Schema documents or directories of `*.json` documents.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Generate `apply_defaults` methods, one file per package.
    Generate {
        /// Schema documents or directories of `*.json` documents.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Directory receiving `{package}.defaults.rs`.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Generator options (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Default a JSON record through the runtime interpreter and print it.
    Apply {
        /// Schema documents or directories of `*.json` documents.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Fully-qualified message name, e.g. `tests.Test`.
        #[arg(long)]
        message: String,
        /// JSON object holding the record; an empty record when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Reject the schema when the checker finds violations.
        #[arg(long)]
        checked: bool,
    },
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: .env: {}", e);
        }
    }
    init_tracing();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Check { paths } => cmd_check(paths)?,
        Commands::Generate {
            paths,
            out_dir,
            config,
        } => cmd_generate(paths, out_dir, config.as_deref())?,
        Commands::Apply {
            paths,
            message,
            input,
            checked,
        } => cmd_apply(paths, message, input.as_deref(), *checked)?,
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn cmd_check(paths: &[PathBuf]) -> anyhow::Result<()> {
    let registry = load_registry(paths)?;
    match checker::check_registry(&registry) {
        Ok(()) => {
            println!(
                "OK: {} message(s) checked",
                registry.user_messages().count()
            );
            Ok(())
        }
        Err(errors) => {
            for err in errors.errors() {
                eprintln!("error: {err}");
            }
            anyhow::bail!("{} defaults rule violation(s)", errors.len())
        }
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

fn cmd_generate(paths: &[PathBuf], out_dir: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let registry = load_registry(paths)?;
    let mut config = match config {
        Some(path) => GeneratorConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => GeneratorConfig::default(),
    };
    config.merge_with_env();

    let files = forge::generate_files(&registry, &config)?;
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    for file in &files {
        let target = out_dir.join(&file.name);
        if write_if_changed(&target, file)? {
            println!("wrote {}", target.display());
        } else {
            println!("unchanged {}", target.display());
        }
    }
    Ok(())
}

/// Writes the file unless the existing content has the same digest.
fn write_if_changed(target: &Path, file: &GeneratedFile) -> anyhow::Result<bool> {
    if let Ok(existing) = std::fs::read(target) {
        if file.matches(&existing) {
            return Ok(false);
        }
    }
    std::fs::write(target, &file.content).with_context(|| format!("writing {}", target.display()))?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

fn cmd_apply(
    paths: &[PathBuf],
    message: &str,
    input: Option<&Path>,
    checked: bool,
) -> anyhow::Result<()> {
    let registry = Arc::new(load_registry(paths)?);
    let json = match input {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => serde_json::Value::Object(serde_json::Map::new()),
    };

    let mut record = DynamicMessage::from_json(Arc::clone(&registry), message, &json)?;
    if checked {
        defaults::apply_checked(&registry, &mut record)?;
    } else {
        defaults::apply(&mut record);
    }
    println!("{}", serde_json::to_string_pretty(&record.to_json())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// schema loading
// ---------------------------------------------------------------------------

fn load_registry(paths: &[PathBuf]) -> anyhow::Result<SchemaRegistry> {
    let mut files = Vec::new();
    for path in paths {
        files.extend(collect_schema_files(path)?);
    }
    if files.is_empty() {
        anyhow::bail!("no schema documents found");
    }
    tracing::debug!(documents = files.len(), "loading schema");
    Ok(SchemaRegistry::load_all(&files)?)
}

fn collect_schema_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    use walkdir::WalkDir;
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        anyhow::bail!("{} does not exist", path.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().and_then(|x| x.to_str()) == Some("json")
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    Ok(files)
}
