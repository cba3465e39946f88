//! Single-decree leader election among a fixed set of actors, using a
//! two-phase Synod (Paxos) exchange over asynchronous messages.
//!
//! Every actor is both acceptor and, after a quiet inactivity window,
//! proposer. At most one proposal number can be accepted by a majority.

pub mod cluster;
pub mod constants;
pub mod error;
pub mod messages;
pub mod nodes;
pub mod transport;
pub mod types;

pub use cluster::Cluster;
pub use error::Error;
pub use messages::{Message, MessageKind, Payload};
pub use nodes::actor::{Actor, ActorStatus};
pub use nodes::stage::{Stage, Transition};
pub use types::{ActorId, ClusterConfig, ProposalNumber, TimeoutConfig};
