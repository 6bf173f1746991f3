use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use cfgsrc_core::{Entry, Event};
use cfgsrc_schema::{builtin, Schemas};
use cfgsrc_source::{channel, KubeSource};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cfgsrcctl", version, about = "In-memory config source CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Resource kinds the source recognizes
    #[arg(long = "registry", value_enum, global = true, default_value_t = Registry::K8s)]
    registry: Registry,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Registry { Basic, K8s }

impl Registry {
    fn schemas(self) -> Schemas {
        match self {
            Registry::Basic => builtin::basic(),
            Registry::K8s => builtin::k8s(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List recognized collections
    Collections,
    /// Apply each file as one content (named by its path) and print the events
    Apply {
        /// YAML files; `-` reads stdin as content "stdin"
        files: Vec<PathBuf>,
        /// Remove a content after all files are applied (repeatable)
        #[arg(long = "remove")]
        remove: Vec<String>,
        /// Clear the source at the end
        #[arg(long = "clear", action = ArgAction::SetTrue)]
        clear: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("CFGSRC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries events; logs go to stderr
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CFGSRC_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CFGSRC_METRICS_ADDR; expected host:port");
        }
    }
}

fn read_input(path: &Path) -> Result<(String, String)> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("reading stdin")?;
        return Ok(("stdin".to_string(), text));
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok((path.display().to_string(), text))
}

fn entry_json(entry: &Entry) -> serde_json::Value {
    serde_json::json!({
        "name": entry.name().to_string(),
        "version": entry.version().to_string(),
        "labels": entry
            .metadata
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<String, serde_json::Value>>(),
        "body": &*entry.body,
    })
}

fn print_event(ev: &Event, output: Output) -> Result<()> {
    match output {
        Output::Human => match ev.entry() {
            Some(e) => println!("{:<9} {} {} {}", ev.kind().as_str(), ev.collection(), e.name(), e.version()),
            None => println!("{:<9} {}", ev.kind().as_str(), ev.collection()),
        },
        Output::Json => {
            let mut v = serde_json::json!({ "kind": ev.kind().as_str(), "collection": ev.collection().as_str() });
            if let Some(e) = ev.entry() {
                v["entry"] = entry_json(e);
            }
            println!("{}", serde_json::to_string(&v)?);
        }
    }
    Ok(())
}

fn print_collections(schemas: &Schemas, output: Output) -> Result<()> {
    match output {
        Output::Human => {
            for s in schemas.all() {
                let scope = if s.is_namespaced() { "namespaced" } else { "cluster" };
                println!("{} • {} {} • {}", s.collection(), s.api_version(), s.kind(), scope);
            }
        }
        Output::Json => {
            let rows: Vec<serde_json::Value> = schemas
                .all()
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "collection": s.collection().as_str(),
                        "apiVersion": s.api_version(),
                        "kind": s.kind(),
                        "plural": s.plural(),
                        "namespaced": s.is_namespaced(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

fn print_views(views: &[(String, Vec<Entry>)], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            for (collection, entries) in views {
                println!("{} ({})", collection, entries.len());
                for e in entries {
                    println!("  {} {}", e.name(), e.version());
                }
            }
        }
        Output::Json => {
            let map: serde_json::Map<String, serde_json::Value> = views
                .iter()
                .map(|(c, es)| (c.clone(), serde_json::Value::Array(es.iter().map(entry_json).collect())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let schemas = cli.registry.schemas();

    match cli.command {
        Commands::Collections => print_collections(&schemas, cli.output)?,
        Commands::Apply { files, remove, clear } => {
            let output = cli.output;
            info!(registry = ?cli.registry, shape_validation = cfgsrc_schema::SHAPE_VALIDATION, "starting source");
            let source = KubeSource::new(schemas);
            let (handler, mut rx) = channel();
            source.dispatch(Arc::new(handler));
            let printer = tokio::spawn(async move {
                let mut printed = 0usize;
                while let Some(ev) = rx.recv().await {
                    if let Err(e) = print_event(&ev, output) {
                        warn!(error = %e, "failed to print event");
                    }
                    printed += 1;
                }
                printed
            });

            source.start();
            let mut rejected = 0usize;
            for path in &files {
                let (name, text) = read_input(path)?;
                if let Err(e) = source.apply_content(&name, &text) {
                    error!(content = %name, error = %e, "snapshot rejected");
                    rejected += 1;
                }
            }
            for name in &remove {
                source.remove_content(name);
            }
            if clear {
                source.clear();
            }

            let contents = source.content_names();
            let views: Vec<(String, Vec<Entry>)> = source
                .schemas()
                .collections()
                .map(|c| (c.to_string(), source.get(c.clone()).all_sorted()))
                .filter(|(_, es)| !es.is_empty())
                .collect();
            // dropping the source closes the channel and lets the printer drain
            drop(source);
            let printed = printer.await?;
            print_views(&views, output)?;
            info!(files = files.len(), rejected, events = printed, contents = contents.len(), "apply finished");
            if rejected > 0 {
                anyhow::bail!("{} snapshot(s) rejected", rejected);
            }
        }
    }
    Ok(())
}
