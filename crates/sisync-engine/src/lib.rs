//! Enrolment reconciliation between an LMS and a Student Information
//! System.
//!
//! The [`SyncEngine`] diffs the reduced remote enrolment of every managed
//! course against local enrolment and role-assignment state, and emits a
//! minimal set of enrol, unenrol, suspend, and role operations through the
//! [`LmsStore`] capability.  Progress is reported line by line through a
//! [`SyncTrace`], which operators rely on for auditing.

pub mod error;
pub mod memory;
pub mod store;
pub mod sync;
pub mod trace;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use memory::MemoryLmsStore;
pub use store::LmsStore;
pub use sync::SyncEngine;
pub use trace::{BufferTrace, NullTrace, SyncTrace, TracingTrace};
pub use types::{
    EnrolInstance, EnrolmentStatus, RoleAssignment, SyncOutcome, SyncReport, UnenrolAction,
    UserEnrolment,
};
