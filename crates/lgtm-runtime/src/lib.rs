//! Deferred command-execution runtime for lgtm-bridge.
//!
//! Hosts the slash-command model, the duplicate-delivery guard, the
//! deferred-job capability, and the pipeline that drives a command through
//! resolve → upload → transform → publish → promote → annotate → clean up.

mod command;
mod dedup;
mod jobs;
mod pipeline;

pub use command::{
    generic_failure_text, invite_instruction_text, is_help_request, please_wait_text, usage_text,
    CommandJob, SlashCommand, COMMAND_JOB_NAME,
};
pub use dedup::DuplicateEventGuard;
pub use jobs::{InProcessJobQueue, JobDispatcher};
pub use pipeline::{complementary_color, CommandPipeline, PipelineError};
