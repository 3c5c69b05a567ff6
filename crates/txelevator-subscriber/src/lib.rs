//! txelevator-subscriber: the upstream half of the pipeline.
//!
//! Holds the single connection to the node's event feed and is the only
//! component that writes to the store.
//!
//! ```text
//! node ──ws──► Subscriber ─► Feed (TopicRouter) ─► EventHandler ─► StoreWriter
//!                 ▲
//!   NodeClient ───┘ reconcile() once before the first connection
//! ```

pub mod convert;
pub mod handler;
pub mod reconcile;
pub mod subscriber;
pub mod topic;

pub use handler::{BlockSummary, EventHandler};
pub use reconcile::{reconcile, ReconcileReport};
pub use subscriber::{Feed, Subscriber, SubscriberConfig};
pub use topic::{Topic, TopicRouter};
