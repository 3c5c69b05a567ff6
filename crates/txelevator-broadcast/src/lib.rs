//! txelevator-broadcast: turns store changes into full snapshots on a bus.
//!
//! Two [`SupervisedDetector`]s run on the primary, one per [`MessageKind`].
//! Each poll compares a cheap [`ChangeFingerprint`](txelevator_core::ChangeFingerprint)
//! with the previous one and only reads and publishes a snapshot when it moved.
//! Workers receive messages through a [`BusReceiver`] and re-emit them on
//! worker-local [`EventStream`]s that gateway connections listen on.

pub mod bus;
pub mod detector;
pub mod source;
pub mod stream;
pub mod supervisor;

pub use bus::{BusMessage, BusReceiver, LocalBus, MessageBus, MessageKind};
pub use detector::{ChangeDetector, TickOutcome};
pub use source::{ChainSnapshotSource, ChangeSource, TipBlockSource};
pub use stream::{EventStream, Listener};
pub use supervisor::{SupervisedDetector, SupervisorConfig};
