//! Per-actor protocol stages and the transition table that drives them.
//!
//! `transition` is the only place where an actor's protocol state reacts to
//! a message. It is keyed on `(stage, message kind)` and returns the next
//! stage plus the messages to send, mutating nothing but `latest_prn` and
//! the acceptance tally.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::messages::{self, Message, Payload};
use crate::types::{ActorId, ClusterConfig, ProposalNumber};

/// Where an actor is in the protocol.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Stage {
    /// Starting stage: no proposal accepted yet.
    Init,
    /// This actor holds every promise for its own proposal and is broadcasting it.
    ValuePhase,
    /// This actor accepted some proposal's value.
    Accepted,
    /// A majority accepted a proposal; the leader is known.
    Finished,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Init => "PINIT",
            Stage::ValuePhase => "PVAL",
            Stage::Accepted => "ACCEPT",
            Stage::Finished => "FINISH",
        };
        f.write_str(name)
    }
}

/// Result of feeding one message to the transition table.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// The message was handled: move to `next` (possibly the same stage)
    /// and send `outgoing`.
    Move { next: Stage, outgoing: Vec<Message> },
    /// The combination is not part of the protocol. Nothing changes.
    Invalid,
}

impl Transition {
    fn stay(stage: Stage, outgoing: Vec<Message>) -> Transition {
        Transition::Move {
            next: stage,
            outgoing,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Transition::Invalid)
    }
}

/// Distinct actors that announced acceptance of each proposal number.
#[derive(Clone, Debug, Default)]
pub struct AcceptCounts {
    accepted_by: HashMap<ProposalNumber, HashSet<ActorId>>,
}

impl AcceptCounts {
    /// Records `from` as accepting `prn` and returns the new count.
    /// Duplicate deliveries leave the count unchanged.
    pub fn record(&mut self, prn: ProposalNumber, from: ActorId) -> usize {
        let voters = self.accepted_by.entry(prn).or_default();
        voters.insert(from);
        voters.len()
    }

    pub fn count(&self, prn: &ProposalNumber) -> usize {
        self.accepted_by.get(prn).map(HashSet::len).unwrap_or_default()
    }
}

/// The protocol fields an actor owns.
#[derive(Clone, Debug)]
pub struct ProtocolState {
    pub id: ActorId,
    actors: Vec<ActorId>,
    majority: usize,
    pub stage: Stage,
    /// Highest proposal number issued, promised or accepted.
    pub latest_prn: ProposalNumber,
    pub accept_counts: AcceptCounts,
    /// First proposal number this actor saw reach a majority.
    pub decided: Option<ProposalNumber>,
}

impl ProtocolState {
    pub fn new(id: ActorId, config: &ClusterConfig) -> ProtocolState {
        ProtocolState {
            id,
            actors: config.actors().collect(),
            majority: config.majority(),
            stage: Stage::Init,
            latest_prn: ProposalNumber::NONE,
            accept_counts: AcceptCounts::default(),
            decided: None,
        }
    }

    pub fn majority(&self) -> usize {
        self.majority
    }

    pub fn all_actors(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.iter().copied()
    }

    fn broadcast<F>(&self, build: F) -> Vec<Message>
    where
        F: Fn(ActorId) -> Message,
    {
        self.all_actors().map(build).collect()
    }
}

/// Computes the reaction of `state` to `msg`.
///
/// Does not write `state.stage`; the caller applies `Transition::Move`.
pub fn transition(state: &mut ProtocolState, msg: &Message) -> Transition {
    let transition = match (&msg.payload, state.stage) {
        (Payload::InitRequest(req), stage) => on_init_request(state, msg.sender, req, stage),
        // Promises are consumed by the proposal round before they get here.
        (Payload::InitResponse(_), _) => Transition::Invalid,
        (Payload::ValueProposal(prop), Stage::Finished) => Transition::stay(
            Stage::Finished,
            vec![Message::value_response(
                state.id,
                msg.sender,
                false,
                prop.prn,
            )],
        ),
        (Payload::ValueProposal(prop), stage) => on_value_proposal(state, msg.sender, prop, stage),
        (Payload::ValueResponse(resp), stage) => on_value_response(state, msg.sender, resp, stage),
    };

    match &transition {
        Transition::Move { next, outgoing } => debug!(
            actor = %state.id,
            from = %state.stage,
            to = %next,
            msg = %msg,
            replies = outgoing.len(),
            "transition"
        ),
        Transition::Invalid => debug!(
            actor = %state.id,
            stage = %state.stage,
            msg = %msg,
            "invalid for stage, ignored"
        ),
    }
    transition
}

fn on_init_request(
    state: &mut ProtocolState,
    sender: ActorId,
    req: &messages::InitRequestMessage,
    stage: Stage,
) -> Transition {
    let promise = match stage {
        Stage::Init => req.prn > state.latest_prn,
        Stage::Accepted => req.prn.cycle() > state.latest_prn.cycle(),
        Stage::ValuePhase | Stage::Finished => false,
    };
    if promise {
        state.latest_prn = req.prn;
    }
    Transition::stay(stage, vec![Message::init_response(state.id, sender, promise)])
}

fn on_value_proposal(
    state: &mut ProtocolState,
    sender: ActorId,
    prop: &messages::ValueProposalMessage,
    stage: Stage,
) -> Transition {
    // Equality accepts the proposal this actor promised (or issued) itself.
    if prop.prn >= state.latest_prn {
        state.latest_prn = prop.prn;
        let id = state.id;
        let outgoing = state.broadcast(|to| Message::value_response(id, to, true, prop.prn));
        Transition::Move {
            next: Stage::Accepted,
            outgoing,
        }
    } else {
        Transition::stay(
            stage,
            vec![Message::value_response(state.id, sender, false, prop.prn)],
        )
    }
}

fn on_value_response(
    state: &mut ProtocolState,
    sender: ActorId,
    resp: &messages::ValueResponseMessage,
    stage: Stage,
) -> Transition {
    if !resp.success {
        return Transition::stay(stage, Vec::new());
    }
    let count = state.accept_counts.record(resp.prn, sender);
    if stage != Stage::Finished && count >= state.majority() {
        state.decided = Some(resp.prn);
        return Transition::stay(Stage::Finished, Vec::new());
    }
    Transition::stay(stage, Vec::new())
}
