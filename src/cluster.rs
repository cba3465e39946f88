//! Wiring of the fixed actor set: one network, one task per actor.

use std::collections::BTreeMap;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::nodes::actor::{Actor, ActorStatus};
use crate::nodes::clock::SystemClock;
use crate::nodes::mailbox::Mailbox;
use crate::nodes::runner;
use crate::nodes::stage::Stage;
use crate::transport::Network;
use crate::types::{ActorId, ClusterConfig, ProposalNumber};

/// A running set of actors spawned on the current tokio runtime.
pub struct Cluster {
    statuses: BTreeMap<ActorId, watch::Receiver<ActorStatus>>,
    tasks: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl Cluster {
    /// Builds the network and spawns every actor.
    pub fn start(config: ClusterConfig) -> anyhow::Result<Cluster> {
        config.validate()?;
        let mut network = Network::new(config.total_actors);
        let mut statuses = BTreeMap::new();
        let mut tasks = Vec::new();

        for id in config.actors() {
            let actor = Actor::new(
                id,
                config.clone(),
                Mailbox::new(),
                Box::new(SystemClock::new()),
            )?;
            let inbox = network
                .take_inbox(id)
                .with_context(|| format!("inbox of {} already taken", id))?;
            let (status_tx, status_rx) = watch::channel(actor.status());
            statuses.insert(id, status_rx);
            tasks.push(tokio::spawn(runner::run(
                actor,
                inbox,
                network.transport(),
                status_tx,
            )));
        }
        info!(actors = config.total_actors, majority = config.majority(), "cluster started");

        Ok(Cluster {
            statuses,
            tasks,
        })
    }

    pub fn status(&self, id: ActorId) -> Option<ActorStatus> {
        self.statuses.get(&id).map(|rx| rx.borrow().clone())
    }

    pub fn statuses(&self) -> Vec<ActorStatus> {
        self.statuses.values().map(|rx| rx.borrow().clone()).collect()
    }

    /// Waits until every actor has reached `Finished` and returns the
    /// proposal number each one saw reach a majority.
    pub async fn wait_for_leader(&mut self) -> anyhow::Result<BTreeMap<ActorId, ProposalNumber>> {
        let mut decided = BTreeMap::new();
        for (id, rx) in self.statuses.iter_mut() {
            let status = rx
                .wait_for(|s| s.stage == Stage::Finished && s.decided.is_some())
                .await
                .with_context(|| format!("{} stopped before deciding", id))?;
            if let Some(prn) = status.decided {
                decided.insert(*id, prn);
            }
        }
        Ok(decided)
    }

    /// Waits for every actor task to end; they only do so on shutdown.
    ///
    /// Tasks cancelled by `shutdown` count as a clean stop.
    pub async fn join(mut self) -> anyhow::Result<()> {
        for task in std::mem::take(&mut self.tasks) {
            match task.await {
                Ok(result) => result?,
                Err(e) if e.is_cancelled() => debug!("actor task cancelled"),
                Err(e) => return Err(anyhow::Error::new(e).context("actor task panicked")),
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
