//! API Schema Graph CLI
//!
//! Command-line interface for building type graphs from OpenAPI documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use api_schema_graph::{analyze, DocumentStore, GraphConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "api-schema-graph")]
#[command(about = "Resolve OpenAPI resource schemas into a type graph")]
#[command(version)]
struct Cli {
    /// Log resolution steps (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the type graph and print it as JSON
    Graph {
        /// Document source: file path or URL (http:// or https://)
        source: String,

        /// Resource to start from (repeatable; default: core resources)
        #[arg(long = "root", short)]
        roots: Vec<String>,

        /// Graph configuration file (JSON or YAML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List the core resources and all definitions of a document
    Resources {
        /// Document source: file path or URL (http:// or https://)
        source: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Graph {
            source,
            roots,
            config,
            output,
            pretty,
        } => run_graph(&source, &roots, config.as_deref(), output, pretty),

        Commands::Resources { source, pretty } => run_resources(&source, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_graph(
    source: &str,
    roots: &[String],
    config_path: Option<&Path>,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let config = match config_path {
        Some(path) => GraphConfig::from_file(path).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?,
        None => GraphConfig::default(),
    };

    let analysis = analyze(source, config, roots).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let json_output = to_json(&analysis.summary(), pretty)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ResourceListing {
    core_resources: Vec<String>,
    definitions: Vec<String>,
}

fn run_resources(source: &str, pretty: bool) -> Result<(), u8> {
    let store = DocumentStore::load(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let listing = ResourceListing {
        core_resources: store.core_resources(),
        definitions: store.definition_names(),
    };
    println!("{}", to_json(&listing, pretty)?);
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}
