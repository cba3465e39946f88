//! The candidate side of an actor: one proposal round canvassing peers
//! one at a time for promises.
//!
//! A round never reads the inbound queue itself. It is a pending-reply slot
//! that the actor's single dispatch loop offers each incoming message to.

use std::collections::{HashMap, VecDeque};

use crate::messages::{Message, Payload};
use crate::types::{ActorId, ProposalNumber};

/// Promise replies still owed by peers whose round ended before they answered.
///
/// Every request gets exactly one reply and each peer's replies arrive in
/// order, so the next `n` replies from a peer owing `n` belong to dead rounds.
#[derive(Clone, Debug, Default)]
pub struct OwedReplies {
    owed: HashMap<ActorId, usize>,
}

impl OwedReplies {
    pub fn owe(&mut self, peer: ActorId) {
        *self.owed.entry(peer).or_default() += 1;
    }

    /// Returns true if `msg` is a reply meant for an earlier round.
    pub fn settle(&mut self, msg: &Message) -> bool {
        if !matches!(msg.payload, Payload::InitResponse(_)) {
            return false;
        }
        match self.owed.get_mut(&msg.sender) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn owed_by(&self, peer: ActorId) -> usize {
        self.owed.get(&peer).copied().unwrap_or_default()
    }
}

/// An in-flight round waiting for the reply of one peer.
#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    prn: ProposalNumber,
    awaiting: ActorId,
    remaining: VecDeque<ActorId>,
}

/// What the proposer should do after starting a round or consuming a reply.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundStep {
    /// Send this request and keep the round pending.
    Ask(Message),
    /// Every peer promised: move to the value phase with this number.
    Promised(ProposalNumber),
    /// A peer refused; the round is over.
    Rejected { by: ActorId },
}

/// How a round treated an incoming message.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The awaited peer answered.
    Answered(RoundStep),
    /// A promise from some other peer, left over from an earlier round.
    Stale,
    /// Any other protocol message; it takes priority and ends the round.
    Interrupted,
}

impl Round {
    /// Starts canvassing `peers` in order for promises on `prn`.
    ///
    /// With no peers the proposer's own promise is already every promise.
    pub fn start(
        proposer: ActorId,
        prn: ProposalNumber,
        peers: impl IntoIterator<Item = ActorId>,
    ) -> (Option<Round>, RoundStep) {
        let mut remaining: VecDeque<ActorId> =
            peers.into_iter().filter(|p| *p != proposer).collect();
        match remaining.pop_front() {
            None => (None, RoundStep::Promised(prn)),
            Some(first) => {
                let round = Round {
                    prn,
                    awaiting: first,
                    remaining,
                };
                let step = RoundStep::Ask(Message::init_request(proposer, first, prn));
                (Some(round), step)
            }
        }
    }

    pub fn prn(&self) -> ProposalNumber {
        self.prn
    }

    pub fn awaiting(&self) -> ActorId {
        self.awaiting
    }

    /// Offers an incoming message to the round.
    ///
    /// On `Answered(Ask(_))` the round stays pending on the next peer;
    /// after any other answer it must be dropped.
    pub fn offer(&mut self, msg: &Message) -> Reply {
        let success = match &msg.payload {
            Payload::InitResponse(resp) if msg.sender == self.awaiting => resp.success,
            Payload::InitResponse(_) => return Reply::Stale,
            _ => return Reply::Interrupted,
        };
        if !success {
            return Reply::Answered(RoundStep::Rejected { by: msg.sender });
        }
        match self.remaining.pop_front() {
            None => Reply::Answered(RoundStep::Promised(self.prn)),
            Some(next) => {
                self.awaiting = next;
                Reply::Answered(RoundStep::Ask(Message::init_request(
                    msg.receiver,
                    next,
                    self.prn,
                )))
            }
        }
    }
}
