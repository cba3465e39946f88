use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::messages::Message;
use crate::nodes::clock::{ClockAction, ClockProvider};
use crate::nodes::mailbox::Mailbox;
use crate::nodes::proposer::{OwedReplies, Reply, Round, RoundStep};
use crate::nodes::stage::{self, ProtocolState, Stage, Transition};
use crate::types;

/// Snapshot of an actor's protocol state.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorStatus {
    pub id: types::ActorId,
    pub stage: Stage,
    pub latest_prn: types::ProposalNumber,
    pub decided: Option<types::ProposalNumber>,
}

impl ActorStatus {
    /// The elected leader, once this actor has seen a majority.
    pub fn leader(&self) -> Option<types::ActorId> {
        self.decided.map(|prn| prn.proposer())
    }
}

/// Who consumed a message handed to `Actor::handle_msg`.
#[derive(Clone, Debug, PartialEq)]
pub enum Handled {
    /// The pending proposal round took it as the awaited reply.
    ByRound,
    /// It went through the stage transition table.
    ByStage(Transition),
}

/// One participant: acceptor for everyone else's proposals and, after a
/// quiet inactivity window, proposer of its own.
pub struct Actor {
    state: ProtocolState,
    config: types::ClusterConfig,
    mailbox: Mailbox,
    // Pending-reply slot of the round this actor is running, if any
    round: Option<Round>,
    owed: OwedReplies,
    clock: Box<dyn ClockProvider + Send>,
    rng: ChaCha8Rng,
}

impl Actor {
    pub fn new(
        actor_id: types::ActorId,
        config: types::ClusterConfig,
        mailbox: Mailbox,
        clock: Box<dyn ClockProvider + Send>,
    ) -> anyhow::Result<Actor> {
        config.validate()?;
        let actor_id = config.check_actor(actor_id)?;
        Ok(Actor {
            state: ProtocolState::new(actor_id, &config),
            rng: ChaCha8Rng::seed_from_u64(config.seed ^ actor_id.get()),
            config,
            mailbox,
            round: None,
            owed: OwedReplies::default(),
            clock,
        })
    }

    pub fn id(&self) -> types::ActorId {
        self.state.id
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn latest_prn(&self) -> types::ProposalNumber {
        self.state.latest_prn
    }

    pub fn accept_count(&self, prn: &types::ProposalNumber) -> usize {
        self.state.accept_counts.count(prn)
    }

    pub fn round_pending(&self) -> bool {
        self.round.is_some()
    }

    pub fn status(&self) -> ActorStatus {
        ActorStatus {
            id: self.state.id,
            stage: self.state.stage,
            latest_prn: self.state.latest_prn,
            decided: self.state.decided,
        }
    }

    /// Arms the first inactivity timer (call once, before the first message).
    pub fn start(&mut self) {
        self.schedule_inactivity();
    }

    pub fn accept_message(&mut self, msg: Message) {
        self.mailbox.receive(msg);
    }

    pub fn work_on_message(&mut self) -> bool {
        match self.mailbox.next_in() {
            None => false,
            Some(msg) => {
                self.handle_msg(msg);
                true
            }
        }
    }

    pub fn deliver_sent(&mut self) -> Option<Message> {
        self.mailbox.deliver_sent()
    }

    pub fn handle_msg(&mut self, msg: Message) -> Handled {
        self.schedule_inactivity();

        let reply = if self.owed.settle(&msg) {
            debug!(actor = %self.state.id, from = %msg.sender, "late reply from an earlier round");
            None
        } else {
            self.round.as_mut().map(|round| round.offer(&msg))
        };
        match reply {
            Some(Reply::Answered(step)) => {
                self.apply_round_step(step);
                return Handled::ByRound;
            }
            Some(Reply::Interrupted) => {
                if let Some(round) = self.round.take() {
                    warn!(
                        actor = %self.state.id,
                        prn = %round.prn(),
                        awaiting = %round.awaiting(),
                        msg = %msg,
                        "round aborted by unexpected message"
                    );
                    self.owed.owe(round.awaiting());
                }
            }
            Some(Reply::Stale) | None => {}
        }

        let transition = stage::transition(&mut self.state, &msg);
        if let Transition::Move { next, outgoing } = &transition {
            self.enter(*next);
            self.mailbox.send_all(outgoing.iter().cloned());
        }
        Handled::ByStage(transition)
    }

    /// Handle timer events from the clock system
    pub fn handle_timer(&mut self, action: ClockAction) {
        match action {
            ClockAction::Inactivity => {
                debug!(actor = %self.state.id, stage = %self.state.stage, "inactivity timer expired");
                self.start_round();
                self.schedule_inactivity();
            }
        }
    }

    /// Check for expired timers and handle them
    pub fn check_timers(&mut self) -> Vec<ClockAction> {
        let expired = self.clock.check_timers();
        for action in &expired {
            self.handle_timer(action.clone());
        }
        expired
    }

    pub fn next_timeout(&self) -> Option<Duration> {
        self.clock.next_timeout()
    }

    /// Starts a new proposal round with the next cycle.
    ///
    /// A round still waiting on a silent peer is abandoned.
    pub fn start_round(&mut self) {
        if self.state.stage == Stage::Finished && !self.config.repropose_after_finish {
            debug!(actor = %self.state.id, "already finished, not proposing");
            return;
        }
        if let Some(stalled) = self.round.take() {
            warn!(
                actor = %self.state.id,
                prn = %stalled.prn(),
                awaiting = %stalled.awaiting(),
                "abandoning stalled round"
            );
            self.owed.owe(stalled.awaiting());
        }

        let prn = match self.state.latest_prn.next_for(self.state.id) {
            Ok(prn) => prn,
            Err(e) => {
                warn!(actor = %self.state.id, "cannot start a round: {}", e);
                return;
            }
        };
        self.state.latest_prn = prn;
        info!(actor = %self.state.id, prn = %prn, "starting proposal round");

        let (round, step) = Round::start(self.state.id, prn, self.state.all_actors());
        self.round = round;
        self.apply_round_step(step);
    }

    fn apply_round_step(&mut self, step: RoundStep) {
        match step {
            RoundStep::Ask(request) => self.mailbox.send(request),
            RoundStep::Promised(prn) => {
                self.round = None;
                self.propose_value(prn);
            }
            RoundStep::Rejected { by } => {
                if let Some(round) = self.round.take() {
                    warn!(actor = %self.state.id, prn = %round.prn(), by = %by, "round rejected");
                }
            }
        }
    }

    fn propose_value(&mut self, prn: types::ProposalNumber) {
        info!(actor = %self.state.id, prn = %prn, "collected every promise, proposing value");
        if self.state.stage != Stage::Finished {
            self.enter(Stage::ValuePhase);
        }
        let id = self.state.id;
        let proposals: Vec<Message> = self
            .state
            .all_actors()
            .map(|to| Message::value_proposal(id, to, prn))
            .collect();
        self.mailbox.send_all(proposals);
    }

    fn enter(&mut self, next: Stage) {
        if next == self.state.stage {
            return;
        }
        if next == Stage::Finished {
            if let Some(prn) = self.state.decided {
                info!(
                    actor = %self.state.id,
                    prn = %prn,
                    leader = %prn.proposer(),
                    "majority reached, leader elected"
                );
            }
        } else {
            debug!(actor = %self.state.id, from = %self.state.stage, to = %next, "stage change");
        }
        self.state.stage = next;
    }

    fn schedule_inactivity(&mut self) {
        let timeouts = &self.config.timeout_config;
        let jitter = self.rng.gen_range(Duration::ZERO..=timeouts.inactivity_jitter);
        let delay = timeouts.inactivity_period + jitter;

        self.clock.cancel(&ClockAction::Inactivity);
        self.clock.schedule(ClockAction::Inactivity, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Payload;
    use crate::nodes::clock::MockClock;
    use crate::types::*;

    fn id(n: u64) -> ActorId {
        ActorId::new(n)
    }

    fn prn(cycle: u64, actor: u64) -> ProposalNumber {
        ProposalNumber::new(cycle, id(actor)).unwrap()
    }

    fn setup(actor: u64) -> Actor {
        let config = ClusterConfig::new(5, None);
        Actor::new(id(actor), config, Mailbox::new(), Box::new(MockClock::new())).unwrap()
    }

    fn sent(actor: &mut Actor) -> Vec<Message> {
        std::iter::from_fn(|| actor.deliver_sent()).collect()
    }

    #[test]
    fn rejects_ids_outside_the_cluster() {
        let config = ClusterConfig::new(5, None);
        assert!(Actor::new(id(6), config.clone(), Mailbox::new(), Box::new(MockClock::new())).is_err());
        assert!(Actor::new(id(0), config, Mailbox::new(), Box::new(MockClock::new())).is_err());
    }

    #[test]
    fn inactivity_deadline_includes_jitter() {
        let mut actor = setup(1);
        assert!(actor.next_timeout().is_none());
        actor.start();

        let timeout = actor.next_timeout().unwrap();
        let config = TimeoutConfig::default();
        assert!(timeout >= config.inactivity_period);
        assert!(timeout <= config.inactivity_period + config.inactivity_jitter);
    }

    #[test]
    fn sub_millisecond_jitter_is_not_lost() {
        let timeouts = TimeoutConfig {
            inactivity_period: Duration::from_secs(2),
            inactivity_jitter: Duration::from_micros(900),
        };
        let deadlines: Vec<Duration> = (0..16)
            .map(|seed| {
                let config = ClusterConfig {
                    seed,
                    ..ClusterConfig::new(5, Some(timeouts.clone()))
                };
                let mut actor =
                    Actor::new(id(1), config, Mailbox::new(), Box::new(MockClock::new())).unwrap();
                actor.start();
                actor.next_timeout().unwrap()
            })
            .collect();

        let latest = timeouts.inactivity_period + timeouts.inactivity_jitter;
        assert!(deadlines.iter().all(|d| *d >= timeouts.inactivity_period && *d <= latest));
        assert!(deadlines.iter().any(|d| *d > timeouts.inactivity_period));
    }

    #[test]
    fn exhausted_cycle_does_not_start_a_round() {
        let mut actor = setup(1);
        let last: ProposalNumber = format!("{}.4", u64::MAX).parse().unwrap();
        actor.handle_msg(Message::init_request(id(4), id(1), last));
        sent(&mut actor);

        actor.handle_timer(ClockAction::Inactivity);

        assert_eq!(actor.latest_prn(), last);
        assert!(!actor.round_pending());
        assert!(sent(&mut actor).is_empty());
        assert!(actor.next_timeout().is_some());
    }

    #[test]
    fn timeout_starts_round_with_next_cycle() {
        let mut actor = setup(3);
        actor.handle_timer(ClockAction::Inactivity);

        assert_eq!(actor.latest_prn(), prn(1, 3));
        assert!(actor.round_pending());
        assert_eq!(sent(&mut actor), vec![Message::init_request(id(3), id(1), prn(1, 3))]);
        assert!(actor.next_timeout().is_some());
    }

    #[test]
    fn full_set_of_promises_moves_to_value_phase() {
        let mut actor = setup(3);
        actor.handle_timer(ClockAction::Inactivity);
        sent(&mut actor);

        for peer in [1, 2, 4, 5] {
            let handled = actor.handle_msg(Message::init_response(id(peer), id(3), true));
            assert_eq!(handled, Handled::ByRound);
        }

        assert_eq!(actor.stage(), Stage::ValuePhase);
        assert!(!actor.round_pending());
        let out = sent(&mut actor);
        // Three more requests, then the proposal to everyone including itself.
        assert_eq!(out.len(), 3 + 5);
        let proposals: Vec<_> = out
            .iter()
            .filter(|m| matches!(m.payload, Payload::ValueProposal(_)))
            .map(|m| m.receiver)
            .collect();
        assert_eq!(proposals, (1..=5).map(id).collect::<Vec<_>>());
    }

    #[test]
    fn refusal_aborts_and_keeps_advanced_prn() {
        let mut actor = setup(3);
        actor.handle_timer(ClockAction::Inactivity);
        sent(&mut actor);

        actor.handle_msg(Message::init_response(id(1), id(3), false));
        assert!(!actor.round_pending());
        assert_eq!(actor.stage(), Stage::Init);
        assert!(sent(&mut actor).is_empty());

        // The next round uses a still higher cycle.
        actor.handle_timer(ClockAction::Inactivity);
        assert_eq!(actor.latest_prn(), prn(2, 3));
    }

    #[test]
    fn unexpected_message_is_processed_and_aborts_round() {
        let mut actor = setup(3);
        actor.handle_timer(ClockAction::Inactivity);
        sent(&mut actor);

        let handled = actor.handle_msg(Message::init_request(id(5), id(3), prn(4, 5)));
        assert!(matches!(handled, Handled::ByStage(Transition::Move { .. })));
        assert!(!actor.round_pending());
        assert_eq!(actor.latest_prn(), prn(4, 5));
        assert_eq!(sent(&mut actor), vec![Message::init_response(id(3), id(5), true)]);
    }

    #[test]
    fn stale_promise_is_invalid_and_round_keeps_waiting() {
        let mut actor = setup(3);
        actor.handle_timer(ClockAction::Inactivity);
        sent(&mut actor);

        let handled = actor.handle_msg(Message::init_response(id(4), id(3), true));
        assert_eq!(handled, Handled::ByStage(Transition::Invalid));
        assert!(actor.round_pending());
        assert!(sent(&mut actor).is_empty());
    }

    #[test]
    fn stalled_round_is_abandoned_on_next_timeout() {
        let mut actor = setup(2);
        actor.handle_timer(ClockAction::Inactivity);
        actor.handle_timer(ClockAction::Inactivity);

        assert!(actor.round_pending());
        assert_eq!(actor.latest_prn(), prn(2, 2));
        let out = sent(&mut actor);
        assert_eq!(out.last(), Some(&Message::init_request(id(2), id(1), prn(2, 2))));
    }

    #[test]
    fn late_reply_of_aborted_round_is_not_a_promise() {
        let mut actor = setup(3);
        actor.handle_timer(ClockAction::Inactivity);
        // Interrupted while actor 1 still owes its reply.
        actor.handle_msg(Message::value_response(id(5), id(3), true, prn(1, 5)));
        assert!(!actor.round_pending());

        actor.handle_timer(ClockAction::Inactivity);
        assert!(actor.round_pending());
        sent(&mut actor);

        let late = actor.handle_msg(Message::init_response(id(1), id(3), true));
        assert_eq!(late, Handled::ByStage(Transition::Invalid));
        assert!(actor.round_pending());
        assert!(sent(&mut actor).is_empty());

        let fresh = actor.handle_msg(Message::init_response(id(1), id(3), true));
        assert_eq!(fresh, Handled::ByRound);
        assert_eq!(sent(&mut actor), vec![Message::init_request(id(3), id(2), prn(2, 3))]);
    }

    fn finish(actor: &mut Actor) {
        for sender in [1, 3, 4] {
            actor.handle_msg(Message::value_response(id(sender), id(2), true, prn(1, 1)));
        }
        assert_eq!(actor.stage(), Stage::Finished);
        assert_eq!(actor.status().leader(), Some(id(1)));
        sent(actor);
    }

    #[test]
    fn finished_actor_does_not_propose_by_default() {
        let mut actor = setup(2);
        finish(&mut actor);

        actor.handle_timer(ClockAction::Inactivity);
        assert!(!actor.round_pending());
        assert!(sent(&mut actor).is_empty());
    }

    #[test]
    fn finished_actor_reproposes_when_enabled() {
        let mut config = ClusterConfig::new(5, None);
        config.repropose_after_finish = true;
        let mut actor = Actor::new(id(2), config, Mailbox::new(), Box::new(MockClock::new())).unwrap();
        finish(&mut actor);

        actor.handle_timer(ClockAction::Inactivity);
        assert!(actor.round_pending());
        assert_eq!(sent(&mut actor), vec![Message::init_request(id(2), id(1), prn(1, 2))]);

        // Every peer promising still leaves the decision in place.
        for peer in [1, 3, 4, 5] {
            actor.handle_msg(Message::init_response(id(peer), id(2), true));
        }
        assert_eq!(actor.stage(), Stage::Finished);
        assert_eq!(actor.status().decided, Some(prn(1, 1)));
    }

    #[test]
    fn single_actor_elects_itself() {
        let config = ClusterConfig::new(1, None);
        let mut actor = Actor::new(id(1), config, Mailbox::new(), Box::new(MockClock::new())).unwrap();
        actor.handle_timer(ClockAction::Inactivity);

        // Loop the proposal and the acceptance back to itself.
        while let Some(msg) = actor.deliver_sent() {
            actor.accept_message(msg);
            while actor.work_on_message() {}
        }
        assert_eq!(actor.stage(), Stage::Finished);
        assert_eq!(actor.status().decided, Some(prn(1, 1)));
    }
}
