//! CLI binary for exercising Waypoint nodes outside a dispatcher.

use std::path::{Path as FsPath, PathBuf};

use clap::{Parser, Subcommand};

use waypoint_location::{Location, LocationSyntax, Unmarked};
use waypoint_pipeline::{default_registry, Node, NodeConfig, Properties, RoutingDecision};
use waypoint_types::{Path, Payload, TransactionContext};

#[derive(Parser)]
#[command(name = "waypoint", version, about = "Run integration nodes against a single message")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke one configured node against an input message
    Invoke {
        /// Path to the .properties file holding `node.<name>.*` keys
        properties: PathBuf,

        /// Name of the node to build
        node: String,

        /// Input message (.json files become tables/lists, anything else text)
        input: PathBuf,

        /// JSON object to seed the transaction context with
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Send a close signal after the message (flushes accumulating nodes)
        #[arg(long)]
        flush: bool,
    },

    /// Resolve a location expression against an input message
    Resolve {
        /// Location expression, e.g. `context:requestType|order.@type`
        location: String,

        /// Input message
        input: PathBuf,

        /// JSON object to seed the transaction context with
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// How unmarked candidates are read: path, literal, or path_or_literal
        #[arg(short, long, default_value = "path")]
        unmarked: String,
    },

    /// Build every node listed under `nodes` without invoking it
    Validate {
        /// Path to the .properties file
        properties: PathBuf,
    },

    /// List the registered node types
    Types,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Invoke {
            properties,
            node,
            input,
            context,
            flush,
        } => {
            cmd_invoke(&properties, &node, &input, context.as_deref(), flush).await?;
        }
        Commands::Resolve {
            location,
            input,
            context,
            unmarked,
        } => {
            cmd_resolve(&location, &input, context.as_deref(), &unmarked).await?;
        }
        Commands::Validate { properties } => {
            cmd_validate(&properties).await?;
        }
        Commands::Types => {
            for node_type in default_registry().types() {
                println!("{node_type}");
            }
        }
    }

    Ok(())
}

async fn load_payload(path: &FsPath) -> anyhow::Result<Payload> {
    let source = tokio::fs::read_to_string(path).await?;
    if path.extension().is_some_and(|ext| ext == "json") {
        Ok(Payload::from_json(serde_json::from_str(&source)?))
    } else {
        Ok(Payload::text(source))
    }
}

async fn load_context(path: Option<&FsPath>) -> anyhow::Result<TransactionContext> {
    let mut ctx = TransactionContext::new();
    if let Some(path) = path {
        let source = tokio::fs::read_to_string(path).await?;
        let values = Payload::from_json(serde_json::from_str(&source)?);
        ctx.set(&Path::root(), values)?;
    }
    Ok(ctx)
}

fn print_decision(decision: &RoutingDecision) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(decision)?);
    Ok(())
}

async fn cmd_invoke(
    properties: &FsPath,
    name: &str,
    input: &FsPath,
    context: Option<&FsPath>,
    flush: bool,
) -> anyhow::Result<()> {
    let props = Properties::load(properties).await?;
    let config = NodeConfig::from_scoped(name, &props);
    let node = default_registry().build(&config)?;

    let payload = load_payload(input).await?;
    let mut ctx = load_context(context).await?;
    tracing::debug!(transaction = %ctx.id(), node = %name, kind = payload.kind().as_str(), "Invoking node");

    print_decision(&node.invoke(&mut ctx, Some(payload)).await?)?;
    if flush {
        print_decision(&node.invoke(&mut ctx, None).await?)?;
    }

    if !ctx.values().as_table().is_some_and(|t| t.is_empty()) {
        eprintln!("context: {}", ctx.snapshot());
    }
    ctx.finish();
    Ok(())
}

async fn cmd_resolve(
    raw: &str,
    input: &FsPath,
    context: Option<&FsPath>,
    unmarked: &str,
) -> anyhow::Result<()> {
    let unmarked: Unmarked = unmarked.parse()?;
    let location = Location::parse(raw, &LocationSyntax::default(), unmarked)?;
    let payload = load_payload(input).await?;
    let ctx = load_context(context).await?;

    let values = location.get_all(&ctx, Some(&payload));
    if values.is_empty() {
        anyhow::bail!("location '{raw}' did not resolve");
    }
    for value in values {
        match value.as_text() {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{}", value.to_json()),
        }
    }
    Ok(())
}

async fn cmd_validate(properties: &FsPath) -> anyhow::Result<()> {
    let props = Properties::load(properties).await?;
    let registry = default_registry();
    let names = props.get_list("nodes");
    if names.is_empty() {
        anyhow::bail!("no nodes listed under 'nodes' in {}", properties.display());
    }

    let mut failed = 0;
    for name in &names {
        let config = NodeConfig::from_scoped(name.as_str(), &props);
        match registry.build(&config) {
            Ok(node) => println!("[OK] {} ({})", name, node.node_type()),
            Err(err) => {
                failed += 1;
                println!("[ERROR] {name}: {err}");
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    println!("{} node(s) valid", names.len());
    Ok(())
}
