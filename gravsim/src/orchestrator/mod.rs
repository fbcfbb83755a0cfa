pub mod broadcast;
pub mod codec;
pub mod messages;
pub mod orchestrator;
pub mod solver;
