//! In-memory transport: one unbounded queue per actor that every other
//! actor (and the actor itself) sends into.
//!
//! Each queue is FIFO, so messages between any ordered pair of actors
//! arrive in send order.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::trace;

use crate::messages::Message;
use crate::transport::Transport;
use crate::types::ActorId;

/// Fixed set of inbound queues for actors `1..=total`, built once.
pub struct Network {
    transport: ChannelTransport,
    inboxes: Vec<Option<Inbox>>,
}

impl Network {
    pub fn new(total_actors: u64) -> Network {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (1..=total_actors)
            .map(|_| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Some(Inbox { rx }))
            })
            .unzip();
        Network {
            transport: ChannelTransport {
                senders: senders.into(),
            },
            inboxes,
        }
    }

    /// A handle that can send to any actor.
    pub fn transport(&self) -> ChannelTransport {
        self.transport.clone()
    }

    /// Hands out the inbound queue of `id`. Each queue has a single
    /// consumer, so this returns `None` once it has been taken.
    pub fn take_inbox(&mut self, id: ActorId) -> Option<Inbox> {
        let index = usize::try_from(id.get()).ok()?.checked_sub(1)?;
        self.inboxes.get_mut(index)?.take()
    }
}

/// Sending side of the network; cheap to clone.
#[derive(Clone)]
pub struct ChannelTransport {
    senders: Arc<[mpsc::UnboundedSender<Message>]>,
}

impl Transport for ChannelTransport {
    fn send(&self, message: Message) -> anyhow::Result<()> {
        let index = (message.receiver.get() as usize)
            .checked_sub(1)
            .with_context(|| format!("no actor {}", message.receiver))?;
        let sender = self
            .senders
            .get(index)
            .with_context(|| format!("no actor {}", message.receiver))?;
        trace!(msg = %message, "sending");
        sender
            .send(message)
            .map_err(|e| anyhow::anyhow!("inbox of {} is closed", e.0.receiver))
    }
}

/// Receiving side of one actor's queue.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    /// Waits for the next message; `None` once every sender is gone.
    pub async fn receive(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}
