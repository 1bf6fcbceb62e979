pub mod assignment;
pub mod delivery;
pub mod driver;
pub mod event;
pub mod reroute;
pub mod schedule;
