//! `consume` subcommand: runs one session and prints the record table.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use insulator_kafka::{
    Client, Cluster, ConsumeFrom, ConsumedRecord, DeserializationFormat, FormatDecoder,
};
use insulator_record_stream::{
    ConsumeRequest, Counters, RecordStreamController, SessionOutcome, SessionStatus, SortColumn,
    SortOrder, StreamEvent, StreamSettings, Subscription, DEFAULT_MAX_ROWS,
};
use tracing::{info, warn};

use crate::config::parse_duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortBy {
    /// Order of arrival, printed live
    #[value(name = "arrival")]
    Arrival,
    #[value(name = "time")]
    Time,
    #[value(name = "key")]
    Key,
    #[value(name = "value")]
    Value,
}

impl From<SortBy> for SortColumn {
    fn from(sort: SortBy) -> Self {
        match sort {
            SortBy::Arrival => SortColumn::Arrival,
            SortBy::Time => SortColumn::Time,
            SortBy::Key => SortColumn::Key,
            SortBy::Value => SortColumn::Value,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct ConsumeOpts {
    /// Topic to consume
    pub topic: String,

    /// Start position: beginning, now, last-hour, last-day, last-week,
    /// last:<N> (records per partition) or since:<RFC3339>
    #[arg(long, default_value = "now")]
    pub from: ConsumeFrom,

    /// Value format: string, raw (base64) or avro (needs a schema registry)
    #[arg(long, default_value = "string")]
    pub format: DeserializationFormat,

    /// Only show records whose key or value contains this text (case-insensitive)
    #[arg(long)]
    pub filter: Option<String>,

    /// Sort column; anything but arrival prints the table once the session ends
    #[arg(long, value_enum, default_value = "arrival")]
    pub sort: SortBy,

    #[arg(long)]
    pub descending: bool,

    /// Rows kept before the oldest are dropped
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    /// Stop once the records present at start have been read
    #[arg(long)]
    pub no_follow: bool,

    /// Stop after this long (e.g. 30s, 5m)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

impl ConsumeOpts {
    fn request(&self) -> ConsumeRequest {
        let request = ConsumeRequest::new(self.topic.clone(), self.from, self.format);
        if self.no_follow {
            request.bounded()
        } else {
            request
        }
    }

    fn order(&self) -> SortOrder {
        if self.descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }

    /// Rows are printed as they arrive only in plain arrival order.
    fn prints_live(&self) -> bool {
        self.sort == SortBy::Arrival && !self.descending
    }
}

pub async fn run(cluster: &Cluster, opts: ConsumeOpts) -> anyhow::Result<()> {
    let client = Client::connect(cluster)
        .await
        .with_context(|| format!("Failed to connect to cluster '{}'", cluster.name))?;
    let decoder = FormatDecoder::for_cluster(cluster)
        .with_context(|| format!("Invalid schema registry settings of '{}'", cluster.name))?;

    let controller = RecordStreamController::new(
        Arc::new(client),
        Arc::new(decoder),
        StreamSettings {
            max_rows: opts.max_rows,
            ..StreamSettings::default()
        },
    );
    controller.set_sort(opts.sort.into(), opts.order()).await;
    if let Some(filter) = &opts.filter {
        controller.set_filter(filter).await;
    }

    let metadata = controller
        .load_metadata(&opts.topic)
        .await
        .with_context(|| format!("Failed to load topic '{}'", opts.topic))?;
    if metadata.is_internal {
        warn!("Topic {} is internal", metadata.name);
    }

    let mut events = controller.subscribe();
    let mut session = controller
        .start_consumption(opts.request())
        .await
        .with_context(|| format!("Failed to consume topic '{}'", opts.topic))?;

    let mut shutdown = setup_shutdown_handler();
    let stop = async {
        tokio::select! {
            _ = shutdown.recv() => {}
            _ = sleep_or_forever(opts.timeout) => info!("Timeout reached, stopping"),
        }
    };

    let mut printer = opts.prints_live().then(|| RowPrinter::new(std::io::stdout()));
    if let Err(e) = follow(&controller, &mut events, printer.as_mut(), stop).await {
        controller.shutdown().await;
        return Err(e);
    }

    let outcome = session.finished().await;
    events.unsubscribe();

    match printer.as_mut() {
        // Rows still queued when the loop was interrupted
        Some(printer) => printer.catch_up(&controller).await?,
        None => {
            for row in controller.visible_rows().await {
                println!("{}", row.to_clipboard_line());
            }
        }
    }

    let counters = *controller.counters().borrow();
    report(&metadata.name, metadata.message_count, &counters);

    match outcome {
        SessionOutcome::Failed(e) => {
            Err(e).with_context(|| format!("Consuming topic '{}' failed", opts.topic))
        }
        SessionOutcome::EndOfStream | SessionOutcome::Cancelled => Ok(()),
    }
}

/// Writes visible rows in arrival order, each at most once.
struct RowPrinter<W> {
    out: W,
    last_seq: Option<u64>,
}

impl<W: Write> RowPrinter<W> {
    fn new(out: W) -> Self {
        Self { out, last_seq: None }
    }

    fn row(&mut self, seq: u64, row: &ConsumedRecord) -> anyhow::Result<()> {
        if self.last_seq.is_some_and(|last| seq <= last) {
            return Ok(());
        }
        writeln!(self.out, "{}", row.to_clipboard_line()).context("Failed to write row")?;
        self.last_seq = Some(seq);
        Ok(())
    }

    /// Prints the visible rows that arrived after the last one printed.
    async fn catch_up(&mut self, controller: &RecordStreamController) -> anyhow::Result<()> {
        for (seq, row) in controller.visible_rows_after(self.last_seq).await {
            self.row(seq, &row)?;
        }
        self.out.flush().context("Failed to write row")
    }
}

/// Follows controller events until the session stops on its own or `stop`
/// resolves, printing rows live when a printer is given.
async fn follow<W: Write>(
    controller: &RecordStreamController,
    events: &mut Subscription,
    mut printer: Option<&mut RowPrinter<W>>,
    stop: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => {
                controller.stop_consumption().await;
                return Ok(());
            }
            event = events.recv() => match event {
                Some(StreamEvent::RowAppended { seq, row, visible: true }) => {
                    if let Some(printer) = printer.as_deref_mut() {
                        printer.row(seq, &row)?;
                    }
                }
                Some(StreamEvent::Lagged(missed)) => {
                    warn!("Output fell behind by {missed} event(s), catching up from the row store");
                    if let Some(printer) = printer.as_deref_mut() {
                        printer.catch_up(controller).await?;
                    }
                }
                Some(StreamEvent::StatusChanged(SessionStatus::Stopped)) | None => return Ok(()),
                Some(_) => {}
            },
        }
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn report(topic: &str, total: u64, counters: &Counters) {
    info!(
        "Topic {topic}: consumed {} of ~{total} message(s), {} decode error(s), {} row(s) dropped",
        counters.consumed, counters.decode_errors, counters.evicted
    );
}

fn setup_shutdown_handler() -> tokio::sync::broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install CTRL+C signal handler: {e}");
            return;
        }

        info!("Received interrupt signal (Ctrl+C)");
        let _ = shutdown_tx.send(());
    });

    shutdown_rx
}
