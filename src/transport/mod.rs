pub mod channel;

use crate::messages;

pub use channel::{ChannelTransport, Inbox, Network};

/// Point-to-point delivery of protocol messages, addressed by `message.receiver`.
pub trait Transport {
    fn send(&self, message: messages::Message) -> anyhow::Result<()>;
}
