//! # Herald Workflow
//!
//! A per-user conversational step sequencer: each workflow is a list of
//! steps, each step asks one question and consumes one answer, and a
//! completion callback fires once the last step passes. The broadcast
//! staging flow (collect message → collect audience → stage + confirm
//! keyboard) is the concrete workflow this crate ships.

pub mod broadcast_flow;
pub mod engine;
pub mod step;

pub use engine::{WorkflowContext, WorkflowDefinition, WorkflowEngine};
pub use step::{StepInput, StepOutcome, WorkflowData, WorkflowStep};
