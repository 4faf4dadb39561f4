//! Agent orchestration engine
//!
//! An [`Orchestrator`] answers one question per session. It plans sub-goals,
//! writes and runs SQL for each of them, repairs failing statements within a
//! bounded number of attempts and finally synthesizes an answer. Every
//! transition is published as a [`StreamEvent`] on the session's
//! [`SessionStream`].
//!
//! ```rust,no_run
//! # async fn demo(orchestrator: dbanalyst_engine::Orchestrator) {
//! let mut stream = orchestrator.start_session("How many users signed up in May?");
//! while let Some(event) = stream.next().await {
//!     println!("{}", serde_json::to_string(&event).unwrap_or_default());
//! }
//! # }
//! ```

pub mod completion;
pub mod event;
pub mod machine;
pub mod nodes;
pub mod orchestrator;
pub mod policy;
pub mod receipt;
pub mod state;
pub mod stream;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use completion::{
    Completion, CompletionCapability, CompletionError, CompletionRequest, LlmCompletion,
};
pub use event::{Clock, EventBody, EventEmitter, ExecutionOutcome, StreamEvent, SystemClock};
pub use machine::{NodeOutcome, Stage};
pub use orchestrator::{Orchestrator, SessionTranscript};
pub use policy::SessionPolicy;
pub use receipt::{SessionOutcome, SessionReceipt, write_receipt};
pub use state::{
    AttemptFailure, AttemptMode, AttemptOutcome, CompletedStep, FailureReason, RunState,
    SessionFailure, StepAttempt, StepStatus,
};
pub use stream::SessionStream;
