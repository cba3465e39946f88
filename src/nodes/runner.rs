use tokio::sync::watch;
use tracing::{error, info};

use crate::nodes::actor::{Actor, ActorStatus};
use crate::transport::{Inbox, Transport};

/// Drives one actor until its inbox closes.
///
/// This loop is the only reader of `inbox`. Each turn races the next
/// inbound message against the actor's inactivity deadline, then flushes
/// whatever the actor queued for sending.
pub async fn run<T: Transport>(
    mut actor: Actor,
    mut inbox: Inbox,
    transport: T,
    status: watch::Sender<ActorStatus>,
) -> anyhow::Result<()> {
    actor.start();
    loop {
        let deadline = actor
            .next_timeout()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::select! {
            received = inbox.receive() => match received {
                Some(msg) => {
                    actor.accept_message(msg);
                    while actor.work_on_message() {}
                }
                None => {
                    info!(actor = %actor.id(), "inbox closed, stopping");
                    return Ok(());
                }
            },
            _ = tokio::time::sleep(deadline) => {
                actor.check_timers();
            }
        }

        while let Some(msg) = actor.deliver_sent() {
            if let Err(e) = transport.send(msg) {
                error!(actor = %actor.id(), "failed to send: {:#}", e);
            }
        }
        status.send_if_modified(|current| {
            let latest = actor.status();
            if *current == latest {
                return false;
            }
            *current = latest;
            true
        });
    }
}
