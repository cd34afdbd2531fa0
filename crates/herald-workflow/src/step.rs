//! The step interface: ask one question, consume one input.

use std::collections::HashMap;

use herald_core::spans::FormattingSpan;

/// Accumulated answers, keyed by whatever names the steps agree on.
pub type WorkflowData = HashMap<String, serde_json::Value>;

/// One piece of user input arriving at the current step.
#[derive(Debug, Clone, Copy)]
pub enum StepInput<'a> {
    /// Free-text message, formatting spans included.
    Message {
        text: &'a str,
        spans: Option<&'a [FormattingSpan]>,
    },
    /// A structured selection, e.g. a button press token.
    Selection(&'a str),
}

/// What consuming an input did.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Input accepted; move to the next step.
    Advance,
    /// Input rejected; stay here and show this corrective text.
    Stay(String),
    /// The step doesn't understand this class of input; stay silently.
    Ignored,
}

/// A single workflow step. Steps hold no per-user state of their own —
/// everything mutable lives in the [`WorkflowData`] map.
pub trait WorkflowStep: Send + Sync {
    /// The question shown when this step becomes current.
    fn question(&self, data: &WorkflowData) -> String;

    /// Consume one input, mutating `data` on acceptance.
    fn consume(&self, data: &mut WorkflowData, input: StepInput<'_>) -> StepOutcome;
}
