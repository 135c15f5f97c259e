//! Analysis requests, jobs and their execution
//!
//! - `query`: bound query, resolved request and its fingerprint
//! - `job`: job status records
//! - `result`: tabular results
//! - `registry`: jobs running on this node
//! - `service`: cached, single-flight execution

pub mod job;
pub mod query;
pub mod registry;
pub mod result;
pub mod service;

pub use job::{AnalysisJob, JobKind, JobState, JobStatus};
pub use query::{
    AnalysisQuery, AnalysisRequest, Direction, Fingerprint, OrderBy, Position, RollUp,
};
pub use registry::{JobProgress, JobRegistry, Registration, RunningJob};
pub use result::AnalysisResult;
pub use service::{AnalysisOutcome, AnalysisService, ExecutorConfig, RunOptions};
