//! Backlog triage orchestration.
//!
//! `TriageRuntime` runs the per-item pipeline (duplicate detection, PR
//! review, label suggestion, vision alignment, scoring), applies the
//! comment and label side effects, and ranks a whole backlog into a report.

pub mod backlog_report;
pub mod host_lookup;
pub mod item_conversion;
pub mod runtime_config;
pub mod triage_runtime;

pub use backlog_report::{
    compare_entries, BacklogEntry, BacklogReport, EntryStatus, ItemFailure, ReportFormat,
};
pub use host_lookup::HostCandidateLookup;
pub use item_conversion::{issue_to_triage_item, parse_created_at, pull_request_to_triage_item};
pub use runtime_config::TriageRuntimeConfig;
pub use triage_runtime::{is_fatal_store_error, ItemTriageReport, TriageRuntime};
