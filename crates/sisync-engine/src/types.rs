//! Local-side records the reconciler reads and mutates.

use uuid::Uuid;

pub use sisync_client::EnrolmentStatus;

/// What to do with a local enrolment whose remote counterpart disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnenrolAction {
    /// Fully unenrol the user from the course.
    Remove,
    /// Suspend the enrolment but keep it on record.
    Suspend,
    /// Suspend the enrolment and strip every role this system assigned for
    /// that user in that course.
    SuspendNoRoles,
    /// Leave the enrolment untouched.
    Keep,
}

/// One configured binding between a managed course and its SIS counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrolInstance {
    pub id: Uuid,
    /// Local course this instance manages.
    pub course_id: Uuid,
    /// Opaque SIS course id the enrolment feed is keyed by.
    pub sis_course_id: String,
    /// Role granted to actively enrolled users.
    pub role_id: Uuid,
    pub enabled: bool,
    pub unenrol_action: UnenrolAction,
}

/// A user's enrolment on one instance.  Mutated only by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEnrolment {
    pub instance_id: Uuid,
    pub user_id: Uuid,
    pub status: EnrolmentStatus,
}

/// A role assignment this system created.  Tagged with the owning instance
/// so assignments made by anyone else are never touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub role_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub instance_id: Uuid,
}

/// Terminal outcome of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every instance in scope was processed.
    Completed,
    /// The subsystem is administratively disabled; owned role assignments
    /// were stripped and the SIS was never contacted.
    DisabledAndUnassigned,
}

impl SyncOutcome {
    /// Process exit code reported to the external scheduler.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::DisabledAndUnassigned => 2,
        }
    }
}

/// What one sync run did, for operator reporting and convergence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// New enrolment records created.
    pub enrolled: usize,
    /// Existing enrolments whose status changed, absence suspensions
    /// included.
    pub updated: usize,
    /// Enrolments fully removed by the absence policy.
    pub unenrolled: usize,
    pub roles_assigned: usize,
    pub roles_unassigned: usize,
    /// Courses skipped for auth, fetch, or no-data reasons.
    pub courses_skipped: usize,
}

impl SyncReport {
    pub(crate) fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            enrolled: 0,
            updated: 0,
            unenrolled: 0,
            roles_assigned: 0,
            roles_unassigned: 0,
            courses_skipped: 0,
        }
    }

    /// Process exit code reported to the external scheduler.
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// Whether the run changed nothing locally.
    pub fn is_noop(&self) -> bool {
        self.enrolled == 0
            && self.updated == 0
            && self.unenrolled == 0
            && self.roles_assigned == 0
            && self.roles_unassigned == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(SyncOutcome::Completed.exit_code(), 0);
        assert_eq!(SyncOutcome::DisabledAndUnassigned.exit_code(), 2);
    }

    #[test]
    fn fresh_report_is_a_noop() {
        let report = SyncReport::new(SyncOutcome::Completed);
        assert!(report.is_noop());
        assert_eq!(report.exit_code(), 0);
    }
}
