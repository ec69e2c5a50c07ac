//! Compute Service Module
//!
//! A small job-execution layer bound to the cluster's storage service.
//!
//! ## Architecture Overview
//! 1. **Submission**: Jobs are recorded in the tracker's table as `Pending`.
//! 2. **Execution**: A fixed pool of tokio workers polls for `Pending` jobs, claims
//!    one atomically and runs its registered handler.
//! 3. **Completion**: The outcome is stored as `Completed` or `Failed` and a user
//!    log line is written for the job.
//!
//! ## Submodules
//! - **`types`**: Job identifiers, status and the context handed to handlers.
//! - **`registry`**: Maps job names (e.g., "copy_lines") to executable Rust code.
//! - **`tracker`**: The `ComputeService` contract and the in-process `MiniJobTracker`.

pub mod registry;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod tests;
