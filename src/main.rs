//! Command-line interface for insulator
//!
//! # Usage Examples
//!
//! ```bash
//! # Clusters configured in ~/.insulator.config (or --config / INSULATOR_CONFIG)
//! insulator clusters
//!
//! # Partition count, message estimate, internal and compacted flags
//! insulator topic describe --cluster local orders
//!
//! # Delete a topic; asks for confirmation unless --yes is given
//! insulator topic delete --cluster local orders
//!
//! # Tail new records until Ctrl+C
//! insulator consume --cluster local orders
//!
//! # Replay the last hour of Avro records sorted by key, then exit
//! insulator consume --cluster local orders \
//!   --from last-hour --format avro --sort key --no-follow
//! ```
//!
//! Records are printed to stdout as `timestamp<TAB>key<TAB>value`; logs go to
//! stderr and are controlled with `RUST_LOG`.

use clap::{Parser, Subcommand};
use insulator::consume::ConsumeOpts;
use insulator::{config, consume, topic, ClusterOpts, ConfigOpts};

#[derive(Parser)]
#[command(name = "insulator")]
#[command(about = "Consume, filter and administer Kafka topics")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured clusters
    Clusters {
        #[command(flatten)]
        config: ConfigOpts,
    },
    /// Inspect or delete a topic
    Topic {
        #[command(subcommand)]
        command: TopicCommand,
    },
    /// Consume a topic and print its records
    Consume {
        #[command(flatten)]
        cluster: ClusterOpts,

        #[command(flatten)]
        opts: ConsumeOpts,
    },
}

#[derive(Subcommand)]
enum TopicCommand {
    /// Show partition count, message count and flags
    Describe {
        #[command(flatten)]
        cluster: ClusterOpts,

        topic: String,
    },
    /// Delete a topic. Irreversible.
    Delete {
        #[command(flatten)]
        cluster: ClusterOpts,

        topic: String,

        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Records go to stdout, keep logs apart
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clusters { config } => {
            let configuration = config::load_configuration(&config).await?;
            if configuration.clusters.is_empty() {
                eprintln!("No clusters configured");
            }
            for cluster in &configuration.clusters {
                println!(
                    "{}\t{}\t{}{}",
                    cluster.guid,
                    cluster.name,
                    cluster.endpoint,
                    if cluster.is_schema_registry_configured() {
                        "\t(schema registry)"
                    } else {
                        ""
                    }
                );
            }
        }
        Commands::Topic { command } => match command {
            TopicCommand::Describe { cluster, topic } => {
                let cluster = config::resolve_cluster(&cluster).await?;
                topic::describe(&cluster, &topic).await?;
            }
            TopicCommand::Delete {
                cluster,
                topic,
                yes,
            } => {
                let cluster = config::resolve_cluster(&cluster).await?;
                topic::delete(&cluster, &topic, yes).await?;
            }
        },
        Commands::Consume { cluster, opts } => {
            let cluster = config::resolve_cluster(&cluster).await?;
            consume::run(&cluster, opts).await?;
        }
    }

    Ok(())
}
