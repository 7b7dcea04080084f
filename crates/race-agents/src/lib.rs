//! Race summarization pipeline.
//!
//! Retrieves corpus passages for each unit of work in a race, fans prompts
//! out to every enabled provider, and reconciles their answers through the
//! triangulation arbiter into a confidence-graded race artifact.

pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod publish;
pub mod race;
pub mod telemetry;

pub use config::{RaceAgentsConfig, ResolvedConfig, RunMode};
pub use engine::{EngineOutcome, ProviderFailure, SummarizationEngine};
pub use orchestrator::{Orchestrator, RaceRun};
pub use providers::{ProviderPool, SharedProviderPool};
pub use publish::{JsonFilePublisher, PublishError, RacePublisher};
pub use race::{CandidateSpec, RaceSpec, RaceSummary};
