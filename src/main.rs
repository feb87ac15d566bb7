//! Topic tree replay tool
//!
//! Reads recorded messages as JSON lines, feeds them through a live topic
//! tree and prints the resulting hierarchy.
//!
//! Each input line is one record:
//!
//! ```text
//! {"topic": "home/kitchen/temp", "payload_text": "21.5"}
//! {"topic": "spBv1.0/plant/NDATA/edge1", "payload_base64": "CAEQ..."}
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use topic_tree::config::{self, EngineConfig, SessionSettings};
use topic_tree::pipeline::{EventBus, NodeId, TopicTree};
use topic_tree::{IncomingMessage, PayloadFormat, PayloadValue, Tree};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Connection id used on the in-process bus
const REPLAY_CONNECTION: &str = "replay";

#[derive(Parser, Debug)]
#[command(name = "topic-tree")]
#[command(about = "Replay recorded messages into a topic tree and print it")]
struct Args {
    /// JSON-lines input file ("-" for stdin)
    input: PathBuf,

    /// Engine config file (defaults to the platform config location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only show topics whose path or payload matches this string
    #[arg(long)]
    filter: Option<String>,

    /// Expand Sparkplug B namespaces into per-metric topics
    #[arg(long)]
    sparkplug: bool,

    /// Payload rendering
    #[arg(long, value_enum, default_value_t = Format::Raw)]
    format: Format,

    /// Print per-topic message counts
    #[arg(long)]
    counts: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Raw,
    Json,
    Hex,
}

impl From<Format> for PayloadFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Raw => PayloadFormat::Raw,
            Format::Json => PayloadFormat::Json,
            Format::Hex => PayloadFormat::Hex,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ReplayRecord {
    topic: String,
    #[serde(default)]
    payload_base64: Option<String>,
    #[serde(default)]
    payload_text: Option<String>,
}

impl ReplayRecord {
    fn into_incoming(self) -> Result<IncomingMessage> {
        let payload = match (self.payload_base64, self.payload_text) {
            (Some(encoded), _) => Some(PayloadValue::from_base64(&encoded)?.to_bytes()),
            (None, Some(text)) => Some(text.into_bytes()),
            (None, None) => None,
        };
        Ok(IncomingMessage::new(self.topic, payload))
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(config::default_path()
            .map(EngineConfig::load_or_default)
            .unwrap_or_default()),
    }
}

fn open_input(input: &PathBuf) -> Result<Box<dyn BufRead>> {
    if input.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Pump the tree until everything published so far is merged.
fn settle(tree: &mut Tree, interval: Duration) {
    let deadline = Instant::now() + interval * 20;
    while !tree.unmerged_changes().is_empty() && Instant::now() < deadline {
        tree.wait_and_pump(interval);
        tree.run_idle();
    }
    if !tree.unmerged_changes().is_empty() {
        tracing::warn!("Merge cadence stalled, draining directly");
        tree.apply_unmerged_changes();
    }
}

fn print_node(tree: &TopicTree, id: NodeId, depth: usize, format: PayloadFormat, counts: bool) {
    for child in tree.sorted_children(id) {
        let indent = "  ".repeat(depth);
        let mut line = format!("{}{}", indent, child.name);
        if let Some(payload) = child.message().and_then(|m| m.payload.as_ref()) {
            let (rendered, _) = payload.format(format);
            let rendered = rendered.lines().collect::<Vec<_>>().join(" ");
            line.push_str(" = ");
            line.push_str(&rendered);
        }
        if counts && child.message_count() > 0 {
            line.push_str(&format!("  ({})", child.message_count()));
        }
        println!("{}", line);
        print_node(tree, child.id, depth + 1, format, counts);
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so the tree can be piped
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,topic_tree=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let mut settings = SessionSettings {
        parse_sparkplug_namespace: args.sparkplug,
        payload_format: args.format.into(),
        ..SessionSettings::default()
    };

    let bus = Arc::new(EventBus::new());
    let mut tree: Tree = Tree::with_config(&config);
    settings.apply_preprocessor(&mut tree);
    tree.update_with_connection(bus.clone(), REPLAY_CONNECTION, None)?;

    tracing::info!(input = %args.input.display(), "Replaying messages");
    let mut published = 0usize;
    for (index, line) in open_input(&args.input)?.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(&line)
            .with_context(|| format!("parsing record on line {}", index + 1))?;
        bus.publish(REPLAY_CONNECTION, record.into_incoming()?);
        published += 1;
        tree.pump();
    }
    settle(&mut tree, config.merge.interval());

    tracing::info!(
        published,
        topics = tree.child_topic_count(),
        dropped = tree.unmerged_changes().dropped(),
        "Replay complete"
    );

    let filter = args.filter.unwrap_or_default();
    let shown = settings.set_topic_filter(&mut tree, &filter)?;
    print_node(&shown, NodeId::ROOT, 0, settings.payload_format, args.counts);

    Ok(())
}
