use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::constants;
use crate::error::Error;

/// An ActorId is the identity of one participant, numbered `1..=total_actors`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
    pub fn new(id: u64) -> ActorId {
        ActorId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Actor{}", self.0)
    }
}

/// A proposal number is a lexicographically ordered pair of a cycle
/// and the identifier of the proposing actor. The actor id breaks
/// ties between proposals issued in the same cycle.
///
/// `ProposalNumber::NONE` (`0.0`) means no proposal has been seen and
/// compares below every issued number.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ProposalNumber {
    cycle: u64,
    proposer: u64,
}

impl ProposalNumber {
    pub const NONE: ProposalNumber = ProposalNumber {
        cycle: 0,
        proposer: 0,
    };

    /// Builds a proposal number. Proposer id 0 is reserved for the sentinel.
    pub fn new(cycle: u64, proposer: ActorId) -> Result<ProposalNumber, Error> {
        if proposer.get() == 0 {
            return Err(Error::InvalidProposalNumber {
                input: format!("{}.{}", cycle, proposer.get()),
                reason: "proposer id 0 is reserved",
            });
        }
        Ok(ProposalNumber {
            cycle,
            proposer: proposer.get(),
        })
    }

    /// The number an actor issues when it starts its next round.
    pub(crate) fn next_for(&self, proposer: ActorId) -> Result<ProposalNumber, Error> {
        let cycle = self
            .cycle
            .checked_add(1)
            .ok_or_else(|| Error::CyclesExhausted {
                prn: self.to_string(),
            })?;
        Ok(ProposalNumber {
            cycle,
            proposer: proposer.get(),
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn proposer(&self) -> ActorId {
        ActorId(self.proposer)
    }

    pub fn decompose(&self) -> (u64, ActorId) {
        (self.cycle, ActorId(self.proposer))
    }

    pub fn is_none(&self) -> bool {
        *self == ProposalNumber::NONE
    }
}

impl Default for ProposalNumber {
    fn default() -> Self {
        ProposalNumber::NONE
    }
}

impl Ord for ProposalNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cycle
            .cmp(&other.cycle)
            .then(self.proposer.cmp(&other.proposer))
    }
}

impl PartialOrd for ProposalNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.cycle, self.proposer)
    }
}

impl FromStr for ProposalNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| Error::InvalidProposalNumber {
            input: s.to_string(),
            reason,
        };
        let (cycle, proposer) = s.split_once('.').ok_or_else(|| invalid("missing '.'"))?;
        if proposer.contains('.') {
            return Err(invalid("more than one '.'"));
        }
        let cycle = parse_decimal(cycle).ok_or_else(|| invalid("cycle is not a decimal integer"))?;
        let proposer =
            parse_decimal(proposer).ok_or_else(|| invalid("actor is not a decimal integer"))?;

        match (cycle, proposer) {
            (0, 0) => Ok(ProposalNumber::NONE),
            (_, 0) => Err(invalid("proposer id 0 is reserved")),
            (cycle, proposer) => Ok(ProposalNumber { cycle, proposer }),
        }
    }
}

// `u64::from_str` accepts a leading '+', which the textual form does not.
fn parse_decimal(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Used by actors to configure the inactivity window that
/// triggers spontaneous candidacy.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeoutConfig {
    pub inactivity_period: Duration,
    // Upper bound of the per-deadline random delay
    pub inactivity_jitter: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            inactivity_period: constants::INACTIVITY_PERIOD,
            inactivity_jitter: constants::INACTIVITY_JITTER,
        }
    }
}

/// A configuration describes the fixed set of actors taking part
/// in the election and how they time out.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterConfig {
    pub total_actors: u64,
    pub timeout_config: TimeoutConfig,
    /// Whether an actor that already saw a decision keeps starting rounds.
    /// Such rounds can displace the decided proposal at actors that have
    /// not counted it yet, so this is off unless asked for.
    pub repropose_after_finish: bool,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            total_actors: constants::DEFAULT_TOTAL_ACTORS,
            timeout_config: TimeoutConfig::default(),
            repropose_after_finish: false,
            seed: 0,
        }
    }
}

impl ClusterConfig {
    pub fn new(total_actors: u64, timeout_config: Option<TimeoutConfig>) -> ClusterConfig {
        ClusterConfig {
            total_actors,
            timeout_config: timeout_config.unwrap_or_default(),
            ..ClusterConfig::default()
        }
    }

    /// Reads overrides from `SYNOD_*` environment variables.
    pub fn from_env() -> anyhow::Result<ClusterConfig> {
        let mut config = ClusterConfig::default();
        if let Some(total) = env_var::<u64>("SYNOD_TOTAL_ACTORS")? {
            config.total_actors = total;
        }
        if let Some(ms) = env_var::<u64>("SYNOD_INACTIVITY_MS")? {
            config.timeout_config.inactivity_period = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("SYNOD_JITTER_MS")? {
            config.timeout_config.inactivity_jitter = Duration::from_millis(ms);
        }
        if let Some(flag) = env_var::<bool>("SYNOD_REPROPOSE_AFTER_FINISH")? {
            config.repropose_after_finish = flag;
        }
        if let Some(seed) = env_var::<u64>("SYNOD_SEED")? {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.total_actors == 0 {
            anyhow::bail!("a cluster needs at least one actor");
        }
        Ok(())
    }

    /// Number of agreeing actors needed for a decision.
    pub fn majority(&self) -> usize {
        (self.total_actors / 2) as usize + 1
    }

    pub fn actors(&self) -> impl Iterator<Item = ActorId> {
        (1..=self.total_actors).map(ActorId::new)
    }

    pub fn check_actor(&self, id: ActorId) -> Result<ActorId, Error> {
        if id.get() == 0 || id.get() > self.total_actors {
            return Err(Error::ActorOutOfRange {
                id: id.get(),
                total: self.total_actors,
            });
        }
        Ok(id)
    }
}

fn env_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value {:?}", name, raw)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(format!("failed to read {}", name))),
    }
}
