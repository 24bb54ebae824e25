// Social-interaction engine - derived view state over content and edge streams
pub mod edge_index;            // Per-snapshot counts and membership
pub mod toggle;                // Keyed query-before-write toggles
pub mod feed;                  // One-shot feed aggregation
pub mod optimistic;            // Optimistic overlay state machine
pub mod comment_thread;        // Live thread derivation
pub mod thread_session;        // Handle returned by open_thread

pub use comment_thread::{derive, CommentThreadAggregator};
pub use edge_index::EdgeIndex;
pub use feed::{post_stats, FeedAggregator, FeedConfig};
pub use optimistic::{MutationPhase, OptimisticMutationController, Settlement, ToggleDecision};
pub use thread_session::{MutationFailure, ThreadSession, ToggleOutcome};
pub use toggle::{EdgeKey, EdgeToggler, WriteOutcome};
