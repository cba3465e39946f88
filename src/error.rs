//! Typed errors surfaced by the protocol types.

/// Errors raised while building or parsing protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Textual or numeric input that is not a valid proposal number.
    #[error("invalid proposal number {input:?}: {reason}")]
    InvalidProposalNumber { input: String, reason: &'static str },

    /// Actor identity outside `1..=total`.
    #[error("actor id {id} is outside the cluster of {total} actors")]
    ActorOutOfRange { id: u64, total: u64 },

    /// No cycle is left above the one this proposal number carries.
    #[error("no cycle left after proposal number {prn}")]
    CyclesExhausted { prn: String },
}
