// src/lib.rs

pub mod activity;
pub mod budget;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod session;
pub mod sources;
pub mod synthesizer;

pub use events::{event_channel, EventSink, ResearchEvent};
pub use orchestrator::{OrchestratorOptions, ResearchOrchestrator};
pub use session::{ResearchRequest, ResearchSession, SessionStatus};
