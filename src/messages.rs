use std::fmt;

use crate::types;

/// A protocol message addressed from one actor to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub sender: types::ActorId,
    pub receiver: types::ActorId,
    pub payload: Payload,
}

/// Tag naming which payload a message carries.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum MessageKind {
    InitRequest,
    InitResponse,
    ValueProposal,
    ValueResponse,
}

/// Enum of all payloads exchanged between actors.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Phase 1: a candidate asks for a promise on its proposal number (prepare).
    InitRequest(InitRequestMessage),
    /// Phase 1: an actor promises (or refuses) not to honour lower proposals.
    InitResponse(InitResponseMessage),
    /// Phase 2: a candidate holding every promise asks for its proposal to be accepted.
    ValueProposal(ValueProposalMessage),
    /// Phase 2: an actor announces to everyone whether it accepted a proposal.
    ValueResponse(ValueResponseMessage),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitRequestMessage {
    pub prn: types::ProposalNumber,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitResponseMessage {
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueProposalMessage {
    pub prn: types::ProposalNumber,
}

/// Broadcast to every actor, so each one can count acceptances on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueResponseMessage {
    pub success: bool,
    pub prn: types::ProposalNumber,
}

impl Message {
    pub fn init_request(
        sender: types::ActorId,
        receiver: types::ActorId,
        prn: types::ProposalNumber,
    ) -> Message {
        Message {
            sender,
            receiver,
            payload: Payload::InitRequest(InitRequestMessage { prn }),
        }
    }

    pub fn init_response(sender: types::ActorId, receiver: types::ActorId, success: bool) -> Message {
        Message {
            sender,
            receiver,
            payload: Payload::InitResponse(InitResponseMessage { success }),
        }
    }

    pub fn value_proposal(
        sender: types::ActorId,
        receiver: types::ActorId,
        prn: types::ProposalNumber,
    ) -> Message {
        Message {
            sender,
            receiver,
            payload: Payload::ValueProposal(ValueProposalMessage { prn }),
        }
    }

    pub fn value_response(
        sender: types::ActorId,
        receiver: types::ActorId,
        success: bool,
        prn: types::ProposalNumber,
    ) -> Message {
        Message {
            sender,
            receiver,
            payload: Payload::ValueResponse(ValueResponseMessage { success, prn }),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.payload {
            Payload::InitRequest(_) => MessageKind::InitRequest,
            Payload::InitResponse(_) => MessageKind::InitResponse,
            Payload::ValueProposal(_) => MessageKind::ValueProposal,
            Payload::ValueResponse(_) => MessageKind::ValueResponse,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MessageKind::InitRequest => "INIT_REQUEST",
            MessageKind::InitResponse => "INIT_RESPONSE",
            MessageKind::ValueProposal => "VALUE_PROPOSAL",
            MessageKind::ValueResponse => "VALUE_RESPONSE",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.payload {
            Payload::InitRequest(m) => write!(
                f,
                "{}[{}] from {} => {}",
                self.kind(),
                m.prn,
                self.sender,
                self.receiver
            ),
            Payload::InitResponse(m) => write!(
                f,
                "{}[{}] from {} => {}",
                self.kind(),
                m.success,
                self.sender,
                self.receiver
            ),
            Payload::ValueProposal(m) => write!(
                f,
                "{}[{}] from {} => {}",
                self.kind(),
                m.prn,
                self.sender,
                self.receiver
            ),
            Payload::ValueResponse(m) => write!(
                f,
                "{}[{}, {}] from {} => {}",
                self.kind(),
                m.success,
                m.prn,
                self.sender,
                self.receiver
            ),
        }
    }
}
