//! Run orchestration.
//!
//! A [`Pipeline`] drives one [`RunContext`] per run through
//! `Gating -> Planning -> Researching -> (Evaluating -> Researching)* ->
//! Summarizing`, and releases every tool process the run acquired before
//! returning its [`RunOutcome`].

pub mod cancel;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod phase;

pub use cancel::CancelToken;
pub use context::RunContext;
pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{Pipeline, PipelineBuilder};
pub use outcome::{artifact_digest, RunFailure, RunOutcome, RunStatus};
pub use phase::RunPhase;
