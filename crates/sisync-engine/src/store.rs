//! LMS data store capability.
//!
//! The reconciler drives the host LMS exclusively through this trait.  Every
//! mutating method is an atomic external operation from the engine's point
//! of view; cascading effects of an unenrol (group membership, grades) are
//! the store's own business.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::{EnrolInstance, EnrolmentStatus, RoleAssignment, UserEnrolment};

#[async_trait]
pub trait LmsStore: Send + Sync {
    /// Every configured instance, enabled or not, optionally restricted to
    /// one course.
    async fn instances(&self, course: Option<Uuid>) -> SyncResult<Vec<EnrolInstance>>;

    /// Resolve an external SIS person id to a local user.
    async fn find_user_by_external_id(&self, external_id: &str) -> SyncResult<Option<Uuid>>;

    /// Current enrolments on one instance.
    async fn enrolments(&self, instance_id: Uuid) -> SyncResult<Vec<UserEnrolment>>;

    /// Create an enrolment record with the given status.  Enrolment only;
    /// role assignment is a separate pass.
    async fn enrol_user(
        &self,
        instance: &EnrolInstance,
        user_id: Uuid,
        status: EnrolmentStatus,
    ) -> SyncResult<()>;

    /// Change the status of an existing enrolment.
    async fn update_enrolment_status(
        &self,
        instance: &EnrolInstance,
        user_id: Uuid,
        status: EnrolmentStatus,
    ) -> SyncResult<()>;

    /// Fully remove a user's enrolment from an instance.
    async fn unenrol_user(&self, instance: &EnrolInstance, user_id: Uuid) -> SyncResult<()>;

    /// Every role assignment this system owns.
    async fn role_assignments(&self) -> SyncResult<Vec<RoleAssignment>>;

    /// Assign a role on behalf of an instance.
    async fn assign_role(&self, assignment: &RoleAssignment) -> SyncResult<()>;

    /// Remove one owned role assignment.
    async fn unassign_role(&self, assignment: &RoleAssignment) -> SyncResult<()>;

    /// Remove every owned role assignment for one user in one course.
    /// Returns how many were removed.
    async fn unassign_user_roles(
        &self,
        instance: &EnrolInstance,
        user_id: Uuid,
    ) -> SyncResult<usize>;

    /// Remove every owned role assignment everywhere.  Returns how many
    /// were removed.  Used when the subsystem is administratively disabled.
    async fn unassign_all_roles(&self) -> SyncResult<usize>;
}
