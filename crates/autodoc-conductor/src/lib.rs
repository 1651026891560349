//! Documentation pipeline engine.
//!
//! Nine stages run strictly in sequence over one shared
//! [`WorkflowState`](autodoc_core::WorkflowState). Each stage is wrapped in
//! an envelope ([`agent::envelope::execute`]) that contains its failures, so a
//! broken stage degrades the run instead of aborting it.

pub mod agent;
pub mod collab;
pub mod graph;
pub mod runner;
pub mod stages;
pub mod state;

pub use agent::envelope::{execute, Stage, StageOutcome, StageReport};
pub use graph::stage::StageId;
pub use runner::driver::{RunDriver, RunOutcome, RunReport};
pub use runner::error::{FatalRun, WorkflowError};
pub use runner::progress::{ProgressObserver, ProgressUpdate};
pub use runner::workflow::{Workflow, WorkflowBuilder};
