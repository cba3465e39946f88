use std::time::Duration;

// Cluster size used when nothing else is configured
pub const DEFAULT_TOTAL_ACTORS: u64 = 5;

// Silence on the inbound queue before an actor becomes a candidate
pub const INACTIVITY_PERIOD: Duration = Duration::from_secs(2);

// Upper bound of the random delay added to each inactivity deadline
pub const INACTIVITY_JITTER: Duration = Duration::from_secs(1);
