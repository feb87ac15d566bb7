//! # topic-tree: live topic tree materialization
//!
//! Turns a continuous stream of topic-addressed messages (as produced by a
//! publish/subscribe broker) into a live, queryable tree keyed by topic path.
//!
//! ## Architecture
//!
//! - **Payloads**: [`PayloadValue`] keeps the raw bytes and renders them as
//!   text, JSON or hex on demand
//! - **Preprocessing**: a [`Preprocessor`] may rewrite or fan out each incoming
//!   message; the namespace expander unpacks Sparkplug B payloads into one
//!   topic per metric
//! - **Buffering**: messages accumulate in a [`ChangeBuffer`] and are merged
//!   into the tree in batches on a fixed cadence
//! - **Filtering**: [`filter_tree`] derives a live sub-tree of the topics
//!   matching a search string
//!
//! ## Configuration
//!
//! Engine settings are read from TOML, by default from `engine.toml` in the
//! platform config directory under `topic-tree`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use topic_tree::{EngineConfig, EventBus, IncomingMessage, Tree};
//!
//! # fn main() -> topic_tree::Result<()> {
//! let config = EngineConfig::load_or_default("engine.toml");
//! let bus = Arc::new(EventBus::new());
//!
//! let mut tree: Tree = Tree::with_config(&config);
//! tree.update_with_connection(bus.clone(), "broker-1", None)?;
//!
//! bus.publish("broker-1", IncomingMessage::new("home/kitchen/temp", Some(b"21.5".to_vec())));
//!
//! // Host loop
//! tree.wait_and_pump(Duration::from_millis(500));
//! for topic in tree.child_topics() {
//!     println!("{} = {:?}", tree.path(topic.id), topic.message().and_then(|m| m.payload_text()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, SessionSettings};
pub use error::{Result, ResultExt, TopicTreeError};
pub use payload::{fix_64bit_values, PayloadFormat, PayloadValue};
pub use pipeline::{
    filter_tree, ChangeBuffer, DecoderKind, DecoderRegistry, EventBus, EventSource,
    FilteredTree, NodeFilter, PreprocessorKind, TopicFilter, TopicTree, Tree, TreeState,
    ViewModel,
};
pub use types::{IncomingMessage, Message, TopicPath};
