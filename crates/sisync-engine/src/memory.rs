//! In-memory [`LmsStore`] used by tests and demos.
//!
//! Tracks a mutation counter so convergence tests can assert that a repeat
//! sync against an unchanged remote makes zero additional writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::store::LmsStore;
use crate::types::{EnrolInstance, EnrolmentStatus, RoleAssignment, UserEnrolment};

#[derive(Default)]
struct Inner {
    instances: Vec<EnrolInstance>,
    users_by_external_id: HashMap<String, Uuid>,
    enrolments: HashMap<(Uuid, Uuid), EnrolmentStatus>,
    assignments: Vec<RoleAssignment>,
}

/// In-memory LMS backend.
#[derive(Default)]
pub struct MemoryLmsStore {
    inner: Mutex<Inner>,
    mutations: AtomicUsize,
}

impl MemoryLmsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of mutating store calls since construction.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Register a local user resolvable by the given external id.
    pub fn add_user(&self, external_id: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().users_by_external_id.insert(external_id.into(), id);
        id
    }

    /// Register an enrolment instance.
    pub fn add_instance(&self, instance: EnrolInstance) {
        self.lock().instances.push(instance);
    }

    /// Current status of one enrolment, if present.
    pub fn enrolment_status(&self, instance_id: Uuid, user_id: Uuid) -> Option<EnrolmentStatus> {
        self.lock().enrolments.get(&(instance_id, user_id)).copied()
    }

    /// Snapshot of every owned role assignment.
    pub fn assignments(&self) -> Vec<RoleAssignment> {
        self.lock().assignments.clone()
    }
}

#[async_trait]
impl LmsStore for MemoryLmsStore {
    async fn instances(&self, course: Option<Uuid>) -> SyncResult<Vec<EnrolInstance>> {
        let inner = self.lock();
        Ok(inner
            .instances
            .iter()
            .filter(|i| course.map_or(true, |c| i.course_id == c))
            .cloned()
            .collect())
    }

    async fn find_user_by_external_id(&self, external_id: &str) -> SyncResult<Option<Uuid>> {
        Ok(self.lock().users_by_external_id.get(external_id).copied())
    }

    async fn enrolments(&self, instance_id: Uuid) -> SyncResult<Vec<UserEnrolment>> {
        let inner = self.lock();
        Ok(inner
            .enrolments
            .iter()
            .filter(|((inst, _), _)| *inst == instance_id)
            .map(|((inst, user), status)| UserEnrolment {
                instance_id: *inst,
                user_id: *user,
                status: *status,
            })
            .collect())
    }

    async fn enrol_user(
        &self,
        instance: &EnrolInstance,
        user_id: Uuid,
        status: EnrolmentStatus,
    ) -> SyncResult<()> {
        self.record_mutation();
        self.lock().enrolments.insert((instance.id, user_id), status);
        Ok(())
    }

    async fn update_enrolment_status(
        &self,
        instance: &EnrolInstance,
        user_id: Uuid,
        status: EnrolmentStatus,
    ) -> SyncResult<()> {
        self.record_mutation();
        self.lock().enrolments.insert((instance.id, user_id), status);
        Ok(())
    }

    async fn unenrol_user(&self, instance: &EnrolInstance, user_id: Uuid) -> SyncResult<()> {
        self.record_mutation();
        self.lock().enrolments.remove(&(instance.id, user_id));
        Ok(())
    }

    async fn role_assignments(&self) -> SyncResult<Vec<RoleAssignment>> {
        Ok(self.lock().assignments.clone())
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> SyncResult<()> {
        self.record_mutation();
        self.lock().assignments.push(assignment.clone());
        Ok(())
    }

    async fn unassign_role(&self, assignment: &RoleAssignment) -> SyncResult<()> {
        self.record_mutation();
        self.lock().assignments.retain(|a| a != assignment);
        Ok(())
    }

    async fn unassign_user_roles(
        &self,
        instance: &EnrolInstance,
        user_id: Uuid,
    ) -> SyncResult<usize> {
        let mut inner = self.lock();
        let before = inner.assignments.len();
        inner
            .assignments
            .retain(|a| !(a.user_id == user_id && a.course_id == instance.course_id));
        let removed = before - inner.assignments.len();
        drop(inner);
        if removed > 0 {
            self.record_mutation();
        }
        Ok(removed)
    }

    async fn unassign_all_roles(&self) -> SyncResult<usize> {
        let mut inner = self.lock();
        let removed = inner.assignments.len();
        inner.assignments.clear();
        drop(inner);
        if removed > 0 {
            self.record_mutation();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnenrolAction;

    fn instance() -> EnrolInstance {
        EnrolInstance {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            sis_course_id: "C1".into(),
            role_id: Uuid::new_v4(),
            enabled: true,
            unenrol_action: UnenrolAction::Remove,
        }
    }

    #[tokio::test]
    async fn enrolment_round_trip() {
        let store = MemoryLmsStore::new();
        let inst = instance();
        store.add_instance(inst.clone());
        let user = store.add_user("p1");

        store
            .enrol_user(&inst, user, EnrolmentStatus::Active)
            .await
            .unwrap();
        assert_eq!(
            store.enrolment_status(inst.id, user),
            Some(EnrolmentStatus::Active)
        );

        store.unenrol_user(&inst, user).await.unwrap();
        assert_eq!(store.enrolment_status(inst.id, user), None);
        assert_eq!(store.mutation_count(), 2);
    }

    #[tokio::test]
    async fn unassign_user_roles_is_scoped_to_the_course() {
        let store = MemoryLmsStore::new();
        let inst = instance();
        let user = Uuid::new_v4();
        let elsewhere = RoleAssignment {
            role_id: inst.role_id,
            user_id: user,
            course_id: Uuid::new_v4(),
            instance_id: Uuid::new_v4(),
        };
        let here = RoleAssignment {
            role_id: inst.role_id,
            user_id: user,
            course_id: inst.course_id,
            instance_id: inst.id,
        };
        store.assign_role(&here).await.unwrap();
        store.assign_role(&elsewhere).await.unwrap();

        assert_eq!(store.unassign_user_roles(&inst, user).await.unwrap(), 1);
        assert_eq!(store.assignments(), vec![elsewhere]);
    }
}
