pub mod actor;
pub mod clock;
pub mod mailbox;
pub mod proposer;
pub mod runner;
pub mod stage;
