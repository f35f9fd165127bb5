//! Skystack Synthesizer CLI
//!
//! Assembles a stack topology from environment parameters and prints the
//! deployment template to stdout. Run with: cargo run --bin synth

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};

use skystack::config::StackParams;
use skystack::stack::{content_stack, function_stack, http_api_stack, StackResult, Template};

#[derive(Parser)]
#[command(name = "synth")]
#[command(about = "Skystack Synthesizer - assemble and print deployment templates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Single function stack
    Function,

    /// Function fronted by an HTTP API
    HttpApi,

    /// Multi-tier content deployment (network, database, filesystem,
    /// compute, load balancer, bastion)
    Content {
        /// Availability zones to spread subnets across
        #[arg(long, env = "ZONE_COUNT", default_value_t = 2,
              value_parser = clap::value_parser!(u8).range(1..=26))]
        zones: u8,
    },
}

fn main() {
    dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let params = match StackParams::from_env() {
        Ok(params) => params,
        Err(err) => {
            error!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Function => function_stack(&params),
        Commands::HttpApi => http_api_stack(&params),
        Commands::Content { zones } => {
            // Zone names are the region plus a letter suffix.
            let zones: Vec<String> = (0..zones)
                .map(|i| format!("{}{}", params.region, (b'a' + i) as char))
                .collect();
            content_stack(&params, &zones)
        }
    };

    match render(result) {
        Ok(()) => {}
        Err(err) => {
            error!("assembly failed: {}", err);
            std::process::exit(1);
        }
    }
}

fn render(result: StackResult<skystack::ResourceGraph>) -> Result<()> {
    let graph = result?;
    graph.validate()?;
    info!(
        stack = graph.name(),
        resources = graph.len(),
        "topology validated"
    );

    let template = Template::from_graph(&graph);
    println!("{}", template.to_json_pretty()?);

    for output in graph.outputs() {
        info!(id = %output.id, value = %output.value, "output");
    }
    Ok(())
}
