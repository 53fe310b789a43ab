//! `topic` subcommands.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use insulator_kafka::{Client, Cluster, FormatDecoder};
use insulator_record_stream::{
    ConfirmAction, DeleteOutcome, RecordStreamController, StreamSettings,
};
use tracing::{info, warn};

async fn controller(cluster: &Cluster) -> anyhow::Result<RecordStreamController> {
    let client = Client::connect(cluster)
        .await
        .with_context(|| format!("Failed to connect to cluster '{}'", cluster.name))?;
    let decoder = FormatDecoder::for_cluster(cluster)?;
    Ok(RecordStreamController::new(
        Arc::new(client),
        Arc::new(decoder),
        StreamSettings::default(),
    ))
}

pub async fn describe(cluster: &Cluster, topic: &str) -> anyhow::Result<()> {
    let controller = controller(cluster).await?;
    let metadata = controller
        .load_metadata(topic)
        .await
        .with_context(|| format!("Failed to describe topic '{topic}'"))?;

    println!("Topic:       {}", metadata.name);
    println!("Partitions:  {}", metadata.partition_count);
    println!("Messages:    {}", metadata.message_count);
    println!("Internal:    {}", metadata.is_internal);
    println!("Compacted:   {}", metadata.is_compacted);
    Ok(())
}

pub async fn delete(cluster: &Cluster, topic: &str, yes: bool) -> anyhow::Result<()> {
    let controller = controller(cluster).await?;
    let confirm = TerminalConfirm { assume_yes: yes };

    match controller
        .delete_topic(topic, &confirm)
        .await
        .with_context(|| format!("Failed to delete topic '{topic}'"))?
    {
        DeleteOutcome::Deleted => println!("Topic '{topic}' deleted"),
        DeleteOutcome::Declined => info!("Topic '{topic}' kept"),
    }
    Ok(())
}

/// Asks on the terminal unless `--yes` was given.
struct TerminalConfirm {
    assume_yes: bool,
}

#[async_trait]
impl ConfirmAction for TerminalConfirm {
    async fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        // Reading stdin blocks, keep it off the runtime's workers
        let question = question.to_string();
        match tokio::task::spawn_blocking(move || ask(&question)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation prompt failed: {e}");
                false
            }
        }
    }
}

/// Yes/no question on the terminal. Anything but an explicit yes is a no.
fn ask(question: &str) -> bool {
    eprint!("{question} [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
