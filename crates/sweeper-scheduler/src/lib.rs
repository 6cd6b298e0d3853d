//! `sweeper-scheduler` — runs file-described recurring graph queries.
//!
//! # Overview
//!
//! A directory holds descriptor files, each a JSON array of
//! [`types::JobDescriptor`]. On every pass the [`runner::JobRunner`] reads each
//! file, asks [`schedule::is_due`] whether a descriptor's interval has elapsed,
//! drains due queries through the [`executor::QueryExecutor`] and writes the
//! whole file back with updated metrics.
//!
//! # Failure isolation
//!
//! | Failure               | Effect                                            |
//! |-----------------------|---------------------------------------------------|
//! | directory unreadable  | pass fails                                        |
//! | file unreadable/bad   | file skipped, not rewritten                       |
//! | backend error/timeout | descriptor left unchanged, retried next due pass  |
//! | malformed result      | drain stops, partial count recorded               |
//! | write failure         | file's updates lost for this pass                 |

pub mod backend;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod runner;
pub mod schedule;
pub mod trigger;
pub mod types;

pub use backend::{BackendError, Neo4jHttpBackend, QueryBackend};
pub use descriptor::DescriptorFile;
pub use error::{JobError, Result};
pub use executor::{ExecutionFailure, ExecutorSettings, QueryExecutor};
pub use runner::{JobRunner, RunnerSettings};
pub use types::{DrainStop, ExecutionReport, JobDescriptor, PassSummary};
