pub mod committer;
pub mod coordinator;
pub mod cost;
pub mod matching;
pub mod reroute;
pub mod scheduler;
