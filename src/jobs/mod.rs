//! Job lifecycle engine.
//!
//! - [`ProcessHandle`]: spawns a program, pumps stdout/stderr into capture
//!   buffers, forwards kill requests and waits for exit
//! - [`Job`]: binds a process to an identifier and owns its status record
//! - [`JobManager`]: the identifier table, with owner/admin visibility
//!
//! # Lifecycle
//!
//! ```text
//! Starting --(spawn ok)----> Running --(exit code)----> Completed
//! Starting --(spawn error)-> Failed
//! Running  --(SIGKILL)-----> Stopped  (exit code -1)
//! Running  --(other)-------> Failed
//! ```
//!
//! The `Running -> terminal` transition is written only by the job's
//! background finalize task. Failures of the process itself are recorded in
//! the status, never returned as errors.

pub mod job;
pub mod manager;
pub mod process;
pub mod status;

pub use job::Job;
pub use manager::{JobManager, JobSummary};
pub use process::ProcessHandle;
pub use status::{JobFailure, JobOutput, JobState, JobStatus, STOPPED_EXIT_CODE};
