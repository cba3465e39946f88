use std::collections::VecDeque;

use crate::messages::Message;

/// Sans-IO mailbox: the runner fills `inbox` and empties `outbox`,
/// the actor does the opposite.
#[derive(Clone, Debug, Default)]
pub struct Mailbox {
    pub inbox: VecDeque<Message>,
    pub outbox: VecDeque<Message>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receive(&mut self, msg: Message) {
        self.inbox.push_back(msg);
    }

    pub fn next_in(&mut self) -> Option<Message> {
        self.inbox.pop_front()
    }

    pub fn send(&mut self, msg: Message) {
        self.outbox.push_back(msg);
    }

    pub fn send_all(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.outbox.extend(msgs);
    }

    pub fn deliver_sent(&mut self) -> Option<Message> {
        self.outbox.pop_front()
    }
}
