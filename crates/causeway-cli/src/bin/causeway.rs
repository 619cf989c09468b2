//! Causeway CLI - run a causal search against a ground-truth DAG
//!
//! Usage:
//!   causeway <truth.json>                         # PC over the measured nodes
//!   causeway <truth.json> --algorithm fci         # FCI, latent nodes hidden
//!   causeway <truth.json> --knowledge k.json -o json
//!
//! The truth file lists measured nodes, latent nodes and directed edges:
//!
//! ```json
//! { "measured": ["A", "B", "C"], "latent": ["L"], "edges": ["A --> B", "L --> B", "L --> C"] }
//! ```

use clap::{Parser, ValueEnum};
use causeway_core::engine::graph::{Graph, NodeId, NodeKind};
use causeway_core::{
    CausalError, DSeparationOracle, Fci, FciConfig, Knowledge, Pc, PcConfig, SearchResult,
};
use serde::Deserialize;
use serde_json::json;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    Pc,
    Cpc,
    PcMax,
    Fci,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Output {
    Summary,
    Json,
}

#[derive(Parser)]
#[command(name = "causeway")]
#[command(version)]
#[command(about = "Causeway - causal structure search")]
#[command(long_about = "Run PC, CPC, PC-Max or FCI with a d-separation oracle over a ground-truth DAG")]
struct Cli {
    /// Ground-truth DAG as JSON
    #[arg(value_name = "FILE")]
    truth: String,

    #[arg(short, long, value_enum, default_value = "pc")]
    algorithm: Algorithm,

    /// Search configuration as JSON (PcConfig or FciConfig fields)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Background knowledge as JSON
    #[arg(short, long, value_name = "FILE")]
    knowledge: Option<String>,

    /// Largest conditioning set; overrides the configuration
    #[arg(short, long)]
    depth: Option<i32>,

    /// Run every stage on the calling thread
    #[arg(long)]
    sequential: bool,

    #[arg(short, long, value_enum, default_value = "summary")]
    output: Output,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Deserialize)]
struct TruthSpec {
    measured: Vec<String>,
    #[serde(default)]
    latent: Vec<String>,
    #[serde(default)]
    edges: Vec<String>,
}

impl TruthSpec {
    fn build(&self) -> Result<Graph, CausalError> {
        let mut graph = Graph::new();
        for name in &self.measured {
            graph.add_node(name, NodeKind::Measured)?;
        }
        for name in &self.latent {
            graph.add_node(name, NodeKind::Latent)?;
        }
        for spec in &self.edges {
            graph.add_edge_spec(spec)?;
        }
        Ok(graph)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let truth: TruthSpec = read_json(&cli.truth);
    let truth = truth.build().unwrap_or_else(|e| fail(&format!("Invalid ground truth: {}", e)));
    let oracle = DSeparationOracle::new(truth).unwrap_or_else(|e| fail(&format!("Invalid ground truth: {}", e)));
    let knowledge = cli.knowledge.as_deref().map(read_json::<Knowledge>).unwrap_or_default();
    tracing::debug!(truth = %cli.truth, algorithm = ?cli.algorithm, "starting search");

    let result = match cli.algorithm {
        Algorithm::Fci => {
            let mut config = cli.config.as_deref().map(read_json::<FciConfig>).unwrap_or_default();
            if let Some(depth) = cli.depth {
                config.max_depth = depth;
            }
            config.parallel &= !cli.sequential;
            Fci::new(&oracle, &knowledge).with_config(config).search()
        }
        algorithm => {
            let mut config: PcConfig = match cli.config.as_deref() {
                Some(path) => read_json::<PcConfig>(path),
                None => match algorithm {
                    Algorithm::Cpc => PcConfig::cpc(),
                    Algorithm::PcMax => PcConfig::pc_max(),
                    _ => PcConfig::default(),
                },
            };
            if let Some(depth) = cli.depth {
                config.max_depth = depth;
            }
            config.parallel &= !cli.sequential;
            Pc::new(&oracle, &knowledge).with_config(config).search()
        }
    };

    let result = result.unwrap_or_else(|e| fail(&format!("Search failed: {}", e)));
    match cli.output {
        Output::Json => match serde_json::to_string_pretty(&format_result(&result)) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(&format!("Error serializing to JSON: {}", e)),
        },
        Output::Summary => print_summary(cli.algorithm, &result),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> T {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("Error reading file '{}': {}", path, e)));
    serde_json::from_str(&text).unwrap_or_else(|e| fail(&format!("Error parsing '{}': {}", path, e)))
}

fn print_summary(algorithm: Algorithm, result: &SearchResult) {
    let status = if result.is_partial() { "partial" } else { "complete" };
    println!("✓ {:?} search {} ({} tests)\n", algorithm, status, result.diagnostics.tests_run());
    print!("{}", result.graph);

    if let Some(report) = &result.legality {
        if report.legal {
            println!("\nLegal result");
        } else {
            println!("\nIllegal result: {}", report.reason);
        }
    }

    let warnings: Vec<String> = result
        .diagnostics
        .warnings()
        .map(|e| e.describe(&result.graph))
        .collect();
    if !warnings.is_empty() {
        println!("\nWarnings ({}):", warnings.len());
        for line in warnings {
            println!("  {}", line);
        }
    }
}

/// Format a SearchResult for JSON output
fn format_result(result: &SearchResult) -> serde_json::Value {
    let graph = &result.graph;
    let name = |id: NodeId| graph.name(id).unwrap_or_default().to_string();
    let edges: Vec<String> = graph.edges().into_iter().map(|e| graph.describe_edge(e)).collect();
    let sepsets: Vec<serde_json::Value> = result
        .sepsets
        .iter()
        .into_iter()
        .map(|((x, y), sepset)| {
            json!({
                "x": name(x),
                "y": name(y),
                "sepset": sepset.nodes.iter().map(|&n| name(n)).collect::<Vec<_>>(),
                "p_value": sepset.p_value,
            })
        })
        .collect();
    json!({
        "nodes": graph.nodes().iter().map(|n| n.name.to_string()).collect::<Vec<_>>(),
        "edges": edges,
        "sepsets": sepsets,
        "completeness": result.completeness,
        "legality": result.legality,
        "tests_run": result.diagnostics.tests_run(),
        "oracle_failures": result.diagnostics.oracle_failures(),
        "diagnostics": result.diagnostics.render(graph),
    })
}
