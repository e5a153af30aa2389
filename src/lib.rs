//! Release notes drafted from the Linear issues a team actually completed.
//!
//! Flow: [`validation`] gates input, [`linear`] aggregates and categorizes
//! issues and builds the prompt pair, [`generation`] turns it into text, and
//! [`pipeline`] strings the steps together.

pub mod config;
pub mod error;
pub mod generation;
pub mod linear;
pub mod pipeline;
pub mod prompts;
pub mod validation;

pub use error::{PipelineError, PipelineFailure};
pub use pipeline::{PipelineOutcome, ReleaseDraft, ReleaseNotesPipeline, ReleaseRequest};
