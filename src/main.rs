/*!
 * EDL command-line interface
 *
 * Thin front-end over the edl library: validate experiment trees,
 * inspect their node hierarchy and convert them into other layouts.
 */

use clap::{Parser, Subcommand, ValueEnum};
use edl::{
    config::{EdlConfig, LogLevel, ValidationMode},
    convert::{convert, HierarchyRule, SchemaDescriptor},
    discover::discover,
    error::{EdlError, Result, EXIT_SUCCESS},
    logging, sanitize_name,
    save::{save, SaveOptions},
    tree::NodeState,
    NodeType,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "edl")]
#[command(version, about = "Experiment Directory Layout toolkit", long_about = None)]
struct Cli {
    /// Validation mode
    #[arg(
        short = 'm',
        long = "mode",
        value_enum,
        default_value = "strict",
        global = true
    )]
    mode: ModeArg,

    /// Skip checksum verification of data parts
    #[arg(long = "no-verify", global = true)]
    no_verify: bool,

    /// Number of worker threads for part checks (0 = one per CPU)
    #[arg(short = 'j', long = "workers", default_value = "0", global = true)]
    workers: usize,

    /// Log level
    #[arg(
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true
    )]
    log_level: LogLevelArg,

    /// Log to file instead of stdout
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (shorthand for --log-level debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a tree and print a findings report
    Validate {
        /// Root directory of the tree
        #[arg(value_name = "DIR")]
        root: PathBuf,
    },

    /// Print the node hierarchy of a tree
    Inspect {
        /// Root directory of the tree
        #[arg(value_name = "DIR")]
        root: PathBuf,

        /// List the data parts of each dataset
        #[arg(long = "parts")]
        parts: bool,
    },

    /// Convert a tree into another layout
    Convert {
        /// Root directory of the source tree
        #[arg(value_name = "SRC")]
        source: PathBuf,

        /// Destination directory (default: named after the converted tree,
        /// next to the source)
        #[arg(value_name = "DEST")]
        dest: Option<PathBuf>,

        /// Target schema identifier
        #[arg(short = 's', long = "schema", value_name = "ID")]
        schema: Option<String>,

        /// Replace the destination if it is not empty
        #[arg(long = "overwrite")]
        overwrite: bool,
    },

    /// List the built-in conversion schemas
    Schemas,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ModeArg {
    Strict,
    Lenient,
}

impl From<ModeArg> for ValidationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => ValidationMode::Strict,
            ModeArg::Lenient => ValidationMode::Lenient,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load config file once and layer CLI overrides on top
    let mut config = if let Some(ref config_path) = cli.config {
        EdlConfig::from_file(config_path).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config file: {}", e);
            EdlConfig::default()
        })
    } else {
        EdlConfig::default()
    };

    config.mode = cli.mode.into();
    config.verify_checksums = !cli.no_verify;
    if cli.workers > 0 {
        config.worker_count = cli.workers;
    }
    config.log_level = cli.log_level.into();
    config.log_file = cli.log.clone();
    config.verbose = cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Validate { root } => run_validate(&root, &config),
        Commands::Inspect { root, parts } => run_inspect(&root, parts, &config),
        Commands::Convert {
            source,
            dest,
            schema,
            overwrite,
        } => {
            if overwrite {
                config.overwrite = true;
            }
            run_convert(&source, dest.as_deref(), schema.as_deref(), &config)
        }
        Commands::Schemas => run_schemas(),
    }
}

fn run_validate(root: &Path, config: &EdlConfig) -> Result<()> {
    let discovery = discover(root, config)?;
    discovery.report.print();

    let error_count = discovery.report.errors.len();
    if error_count > 0 {
        return Err(EdlError::structural(
            ".",
            format!("validation failed with {} error(s)", error_count),
        ));
    }
    Ok(())
}

fn run_inspect(root: &Path, show_parts: bool, config: &EdlConfig) -> Result<()> {
    // Inspection always wants the full tree, even a damaged one
    let mut config = config.clone();
    config.mode = ValidationMode::Lenient;
    let discovery = discover(root, &config)?;

    for (path, node) in discovery.tree.walk_with_paths() {
        let depth = if path == "." {
            0
        } else {
            path.matches('/').count() + 1
        };
        let indent = "  ".repeat(depth);
        let marker = if node.state == NodeState::Invalid {
            "❌"
        } else if node.kind == NodeType::Dataset {
            "📄"
        } else {
            "📁"
        };
        println!("{}{} {} [{}]", indent, marker, node.name, node.kind.as_str());
        if show_parts {
            for part in &node.parts {
                println!(
                    "{}    · {} ({})",
                    indent, part.reference.filename, part.reference.part_type
                );
            }
        }
        for warning in &node.warnings {
            println!("{}    ⚠️  {}", indent, warning);
        }
        for error in &node.errors {
            println!("{}    ❌ {}", indent, error);
        }
    }

    println!();
    println!(
        "{} node(s), {} warning(s), {} error(s)",
        discovery.report.nodes_scanned,
        discovery.report.warnings.len(),
        discovery.report.errors.len()
    );
    Ok(())
}

fn run_convert(
    source: &Path,
    dest: Option<&Path>,
    schema: Option<&str>,
    config: &EdlConfig,
) -> Result<()> {
    let schema_id = schema
        .map(str::to_owned)
        .or_else(|| config.target_schema.clone())
        .ok_or_else(|| {
            EdlError::config(format!(
                "no target schema given, pass --schema (built-in: {})",
                SchemaDescriptor::builtin_ids().join(", ")
            ))
        })?;

    let descriptor = SchemaDescriptor::by_id(&schema_id).ok_or_else(|| {
        EdlError::config(format!(
            "unknown schema '{}' (built-in: {})",
            schema_id,
            SchemaDescriptor::builtin_ids().join(", ")
        ))
    })?;

    let discovery = discover(source, config)?;
    let conversion = convert(&discovery.tree, &descriptor)?;
    let dest = match dest {
        Some(dest) => dest.to_path_buf(),
        None => derive_destination(source, &conversion.tree.name)?,
    };

    let options = SaveOptions {
        overwrite: config.overwrite,
        emit_manifests: descriptor.emit_manifests,
    };
    let report = save(&conversion.tree, &dest, &options)?;
    println!("Converted into {}", dest.display());
    report.print();
    Ok(())
}

/// Destination next to the source, named after the converted tree's root
fn derive_destination(source: &Path, name: &str) -> Result<PathBuf> {
    let parent = source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let dest = parent.join(sanitize_name(name));
    if dest == source {
        return Err(EdlError::config(format!(
            "derived destination '{}' is the source itself, pass an explicit destination",
            dest.display()
        )));
    }
    Ok(dest)
}

fn run_schemas() -> Result<()> {
    println!("Built-in conversion schemas:");
    for id in SchemaDescriptor::builtin_ids() {
        if let Some(descriptor) = SchemaDescriptor::by_id(id) {
            let layout = match descriptor.hierarchy {
                HierarchyRule::Preserve => "preserves the source hierarchy",
                HierarchyRule::Flatten => "flattens into a single dataset",
            };
            println!("  {:<8} {}", id, layout);
        }
    }
    Ok(())
}
