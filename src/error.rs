//!
//! Defines error types for the colony kernel.

use crate::types::ProcessId;

/// Errors raised by kernel operations: process table management, topic
/// access, configuration and persisted state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// A process with the same id is already registered.
    #[error("Process already registered: {0}")]
    DuplicateProcess(ProcessId),
    /// No process with this id is registered.
    #[error("Process not found: {0}")]
    ProcessNotFound(ProcessId),
    /// The topic exists but carries a different payload type.
    #[error("Topic '{topic}' does not carry payloads of type {expected}")]
    TopicTypeMismatch { topic: String, expected: &'static str },
    /// The configuration is malformed or out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// The persisted-state store failed to load or save.
    #[error("State store error: {0}")]
    Store(String),
    /// A value could not be serialized to or deserialized from the store.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }
}

/// Failure of a single `Runnable` invocation. Caught at the process
/// boundary; never propagated to the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The runnable reported a failure.
    #[error("Process failed: {0}")]
    Failed(String),
    /// The runnable panicked. Carries the panic message when it was a string.
    #[error("Process panicked: {0}")]
    Panicked(String),
    /// A kernel service used by the runnable failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl ProcessError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ProcessError::Failed(msg.into())
    }
}
