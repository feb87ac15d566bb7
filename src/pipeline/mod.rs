//! Message materialization pipeline.
//!
//! Messages flow from a live source into a topic tree:
//!
//! ```text
//! [EventSource] ──► [Preprocessor] ──► [ChangeBuffer] ──(tick)──► [TopicTree]
//!                    0..n messages       drained in batches          │
//!                                                                    ▼
//!                                                        "updated" ──► listeners
//! ```
//!
//! # Design
//!
//! - **Enum dispatch** — `Preprocessor` and `BuiltinDecoder` are closed enums.
//! - **Arena tree** — flat `Vec<TopicNode>` with `NodeId` as array index; parent
//!   links are indices and never own anything.
//! - **Preprocess at intake** — rewriting happens on the source's thread, before
//!   buffering. The merge only ever sees final topics.
//! - **Host-driven merging** — the owner of a `Tree` pumps it; one merge per
//!   tick, one notification per merge.
//! - **Decode errors are values** — a failed decode degrades to raw bytes and
//!   never propagates as an error.

pub mod bridge;
pub mod change_buffer;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod id;
pub mod preprocessor;
pub mod sparkplug;
pub mod topic_tree;
pub mod tree;

pub use bridge::{EventBus, EventSource, MessageHandler, UpdateDispatcher, UpdateListener};
pub use change_buffer::ChangeBuffer;
pub use decoder::{BuiltinDecoder, DecodedPayload, DecoderKind, DecoderRegistry};
pub use error::{DecodeError, DecodeResult};
pub use filter::{filter_tree, FilteredTree, TopicFilter};
pub use id::{ListenerId, NodeId, SubscriptionId, TreeIdentity};
pub use preprocessor::{NamespaceExpander, Preprocessor, PreprocessorKind};
pub use topic_tree::{TopicNode, TopicTree, ViewModel};
pub use tree::{NodeFilter, Tree, TreeState};
