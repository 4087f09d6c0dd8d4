//! Sweep CLI - Triple store cleanup from the command line
//!
//! Usage:
//!   sweep graphs
//!   sweep scan <graph>
//!   sweep delete <uri>... [--from-scan <graph>] [--dry-run]
//!   sweep duplicates <class> [--filter field=value]...
//!   sweep links count|list|delete [--prefix <iri>]
//!   sweep links insert <local> <external>
//!   sweep peers
//!   sweep classes
//!   sweep compare <a.json> <b.json>
//!
//! Author: hephaex@gmail.com

mod demo;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use sweep_cleanup::{CascadeReport, LayerReport, Listing, Sweeper};
use sweep_core::{AppConfig, LoggingConfig, NodeRef};
use sweep_query::{FilterOptions, LinkPair};
use sweep_store::{EndpointFailure, ExecutionOutcome};

const DEFAULT_CONFIG: &str = "config/sweep.toml";

#[derive(Parser)]
#[command(name = "sweep")]
#[command(about = "Find and remove unreferenced nodes in RDF triple stores")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $SWEEP_CONFIG, then config/sweep.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory store seeded with sample data
    #[arg(long, global = true)]
    demo: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List graphs that can be scanned
    Graphs,
    /// Report nodes of a graph that nothing references
    Scan {
        /// Graph IRI
        graph: String,
    },
    /// Delete nodes and everything they reference
    Delete {
        /// Node IRIs to delete
        uris: Vec<String>,
        /// Only accept nodes reported isolated by a fresh scan of this graph
        #[arg(long)]
        from_scan: Option<String>,
        /// With --from-scan, delete every reported node
        #[arg(long, requires = "from_scan")]
        all: bool,
        /// Show the layers that would be deleted without deleting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Group entities of a class by their appellation
    Duplicates {
        /// Class IRI; subclasses are included
        class: String,
        /// Value filter as field=value, repeatable
        #[arg(short, long)]
        filter: Vec<String>,
        /// Comparison operator for filters
        #[arg(long, default_value = "=")]
        operator: String,
        /// Insert filter values without quoting
        #[arg(long)]
        unquoted: bool,
    },
    /// Maintain copy-of links between installations
    Links {
        #[command(subcommand)]
        action: LinkAction,
    },
    /// List peer installations
    Peers,
    /// List classes of the CRM graph
    Classes,
    /// Compare two JSON records field by field
    Compare {
        /// Record driving the comparison
        a: PathBuf,
        /// Record compared against
        b: PathBuf,
    },
}

#[derive(Subcommand)]
enum LinkAction {
    /// Count links
    Count {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// List links
    List {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Delete links
    Delete {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Link a local entity to the external entity it duplicates
    Insert { local: String, external: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    if let Commands::Compare { a, b } = &cli.command {
        return compare(a, b, cli.json);
    }

    let sweeper = if cli.demo {
        demo::sweeper(&config).await?
    } else {
        config
            .require_endpoints()
            .context("no triple store to talk to; pass --demo to try a seeded in-memory store")?;
        Sweeper::from_config(&config)?
    };
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Graphs => {
            let graphs = sweeper.catalog().graphs().await?;
            out.listing(&graphs, |g| println!("{g}"))?;
        }
        Commands::Scan { graph } => {
            let report = sweeper.scanner().scan(&NodeRef::new(graph)?).await?;
            out.emit(&report, || {
                for (class, records) in report.by_class() {
                    println!("{class} ({})", records.len());
                    for record in records {
                        println!("  {}  notes: {}", record.uri, record.notes.len());
                    }
                }
                println!(
                    "{} isolated nodes, {} referenced notes",
                    report.isolated_count, report.notes_count
                );
                print_failures(&report.failures);
            })?;
        }
        Commands::Delete {
            uris,
            from_scan,
            all,
            dry_run,
        } => {
            let requested = uris
                .iter()
                .map(NodeRef::new)
                .collect::<Result<Vec<_>, _>>()?;

            let roots: BTreeSet<NodeRef> = match from_scan {
                Some(graph) => {
                    let mut scanner = sweeper.scanner();
                    let report = scanner.scan(&NodeRef::new(graph)?).await?;
                    let selection = if all {
                        scanner.confirm_all(&report)?
                    } else {
                        scanner.confirm(&report, &requested)?
                    };
                    for rejected in &selection.rejected {
                        eprintln!("not isolated, skipped: {rejected}");
                    }
                    selection.nodes
                }
                None => requested.into_iter().collect(),
            };

            if roots.is_empty() {
                println!("nothing to delete");
                return Ok(());
            }

            let deleter = sweeper.deleter();
            if dry_run {
                let layers = deleter.discover(&roots).await?;
                out.emit(&layers, || print_layers(&layers))?;
            } else {
                let report = deleter.delete(&roots).await?;
                out.emit(&report, || print_cascade(&report))?;
                if !report.is_complete() {
                    bail!(
                        "{} layer(s) incomplete; re-run to finish",
                        report.incomplete_layers().count()
                    );
                }
            }
        }
        Commands::Duplicates {
            class,
            filter,
            operator,
            unquoted,
        } => {
            let filters = parse_filters(&filter)?;
            let options = if unquoted {
                FilterOptions::unquoted()
            } else {
                FilterOptions::default()
            }
            .with_operator(operator);

            let report = sweeper
                .store_duplicates()
                .find_with(&NodeRef::new(class)?, &filters, &options)
                .await?;
            out.emit(&report, || {
                for (leaf, entities) in report.duplicates() {
                    println!("{leaf} ({})", entities.len());
                    for (entity, display) in entities {
                        println!("  {entity}");
                        for line in display.lines() {
                            println!("    {line}");
                        }
                    }
                }
                println!(
                    "{} values, {} with duplicates",
                    report.groups.len(),
                    report.duplicates().count()
                );
                print_failures(&report.failures);
            })?;
        }
        Commands::Links { action } => {
            let links = sweeper.links();
            match action {
                LinkAction::Count { prefix } => {
                    let count = links.count(prefix.as_deref()).await?;
                    out.emit(&count, || {
                        println!("{}", count.total);
                        print_failures(&count.failures);
                    })?;
                }
                LinkAction::List { prefix } => {
                    let listed = links.list(prefix.as_deref()).await?;
                    out.listing(&listed, |link| println!("{} -> {}", link.local, link.external))?;
                }
                LinkAction::Delete { prefix } => {
                    let outcomes = links.delete(prefix.as_deref()).await?;
                    out.emit(&outcomes, || print_outcomes(&outcomes))?;
                }
                LinkAction::Insert { local, external } => {
                    let pair = LinkPair::new(NodeRef::new(local)?, NodeRef::new(external)?);
                    let outcomes = links.insert(&[pair]).await?;
                    out.emit(&outcomes, || print_outcomes(&outcomes))?;
                }
            }
        }
        Commands::Peers => {
            let peers = sweeper.catalog().peers().await?;
            out.listing(&peers, |peer| {
                println!("{}  {}  url={}  prefix={}", peer.name, peer.uri, peer.url, peer.prefix)
            })?;
        }
        Commands::Classes => {
            let classes = sweeper.catalog().crm_classes().await?;
            out.listing(&classes, |class| println!("{class}"))?;
        }
        Commands::Compare { .. } => {}
    }

    Ok(())
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("SWEEP_CONFIG").map(PathBuf::from))
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()));

    let config = match path {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sweep={}", logging.level).into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_filters(raw: &[String]) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in raw {
        let Some((field, value)) = item.split_once('=') else {
            bail!("filter {item:?} is not field=value");
        };
        filters
            .entry(field.trim().to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(filters)
}

fn compare(a: &Path, b: &Path, json: bool) -> anyhow::Result<()> {
    let read = |path: &Path| -> anyhow::Result<serde_json::Value> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    };
    let diff = sweep_diff::compare(&read(a)?, &read(b)?)?;

    Output { json }.emit(&diff, || {
        for (path, status) in diff.leaves() {
            println!("{status:<8} {path}");
        }
        let summary = diff.summary();
        println!(
            "{} match, {} conflict, {} absent",
            summary.matches, summary.conflicts, summary.absent
        );
    })
}

// ============================================================================
// Output
// ============================================================================

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }

    fn listing<T: Serialize>(&self, listing: &Listing<T>, line: impl Fn(&T)) -> anyhow::Result<()> {
        self.emit(listing, || {
            listing.items.iter().for_each(&line);
            print_failures(&listing.failures);
        })
    }
}

fn print_failures(failures: &[EndpointFailure]) {
    for failure in failures {
        eprintln!("endpoint {} failed: {}", failure.endpoint, failure.error);
    }
}

fn print_outcomes(outcomes: &[ExecutionOutcome]) {
    for outcome in outcomes {
        match outcome {
            ExecutionOutcome::Applied { endpoint, .. } => println!("{endpoint}: applied"),
            ExecutionOutcome::Failed { endpoint, error } => println!("{endpoint}: failed: {error}"),
        }
    }
}

fn print_layers(layers: &[LayerReport]) {
    for layer in layers {
        println!("depth {} ({} nodes)", layer.depth, layer.nodes.len());
        for node in &layer.nodes {
            println!("  {node}");
        }
        print_failures(&layer.discovery_failures);
    }
}

fn print_cascade(report: &CascadeReport) {
    print_layers(&report.layers);
    for layer in report.skipped_layers() {
        println!("depth {}: left in place, references could not be fully listed", layer.depth);
    }
    for layer in &report.layers {
        for outcome in layer.outcomes.iter().filter(|o| !o.is_success()) {
            if let ExecutionOutcome::Failed { endpoint, error } = outcome {
                println!("depth {}: {endpoint} failed: {error}", layer.depth);
            }
        }
    }
    println!(
        "{} nodes deleted across {} layers",
        report.node_count(),
        report.layers.len()
    );
}
