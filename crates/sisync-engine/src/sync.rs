//! Enrolment reconciliation.
//!
//! One [`SyncEngine::sync`] run walks every managed instance, diffs the
//! reduced SIS enrolment against local state, applies the configured
//! absence policy, and finishes with two role-reconciliation passes.  The
//! run is strictly sequential and convergent: repeating it against an
//! unchanged remote makes no further mutations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use sisync_client::SisClient;

use crate::error::SyncResult;
use crate::store::LmsStore;
use crate::trace::SyncTrace;
use crate::types::{
    EnrolInstance, EnrolmentStatus, RoleAssignment, SyncOutcome, SyncReport, UnenrolAction,
};

/// Drives enrolment synchronization between the SIS and the LMS store.
pub struct SyncEngine {
    client: SisClient,
    store: Arc<dyn LmsStore>,
    /// Administrative kill switch.  When off, sync strips every owned role
    /// assignment and never contacts the SIS.
    enabled: bool,
}

impl SyncEngine {
    pub fn new(client: SisClient, store: Arc<dyn LmsStore>, enabled: bool) -> Self {
        Self {
            client,
            store,
            enabled,
        }
    }

    /// Reconcile enrolment, optionally restricted to one course.
    ///
    /// Per-course failures (auth, fetch, unresolvable users) are traced and
    /// skipped; only store failures and unexpected token-flow errors abort
    /// the run.
    pub async fn sync(
        &self,
        trace: &dyn SyncTrace,
        course: Option<Uuid>,
    ) -> SyncResult<SyncReport> {
        if !self.enabled {
            let removed = self.store.unassign_all_roles().await?;
            trace.line(&format!(
                "enrolment sync is disabled, removed {removed} role assignments"
            ));
            let mut report = SyncReport::new(SyncOutcome::DisabledAndUnassigned);
            report.roles_unassigned = removed;
            return Ok(report);
        }

        trace.line("starting enrolment synchronization");
        let mut report = SyncReport::new(SyncOutcome::Completed);

        // Enrolment tracking runs for every instance, disabled ones
        // included; only role assignment is gated on the enabled flag.
        let instances = self.store.instances(course).await?;
        for instance in &instances {
            self.sync_instance(trace, instance, &mut report).await?;
        }

        self.reconcile_roles(trace, &instances, &mut report).await?;

        trace.line("enrolment synchronization finished");
        Ok(report)
    }

    async fn sync_instance(
        &self,
        trace: &dyn SyncTrace,
        instance: &EnrolInstance,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let course = &instance.sis_course_id;

        if !self.client.is_logged_in().await {
            trace.error(&format!(
                "skipping course {course}: could not authenticate against the SIS"
            ));
            report.courses_skipped += 1;
            return Ok(());
        }

        let remote = match self.client.get_course_enrollment(course).await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                trace.line(&format!("skipping course {course}: no enrolment data"));
                report.courses_skipped += 1;
                return Ok(());
            }
            Err(e) => {
                trace.error(&format!("skipping course {course}: fetch failed: {e}"));
                report.courses_skipped += 1;
                return Ok(());
            }
        };

        let existing: HashMap<Uuid, EnrolmentStatus> = self
            .store
            .enrolments(instance.id)
            .await?
            .into_iter()
            .map(|e| (e.user_id, e.status))
            .collect();

        // Deterministic application order regardless of map iteration.
        let mut remote: Vec<(String, EnrolmentStatus)> = remote.into_iter().collect();
        remote.sort_by(|a, b| a.0.cmp(&b.0));

        let mut touched: HashSet<Uuid> = HashSet::new();
        for (external_id, status) in remote {
            let Some(user_id) = self.store.find_user_by_external_id(&external_id).await? else {
                trace.line(&format!(
                    "course {course}: no local user for SIS id {external_id}, skipped"
                ));
                continue;
            };
            touched.insert(user_id);

            match existing.get(&user_id) {
                None => {
                    self.store.enrol_user(instance, user_id, status).await?;
                    report.enrolled += 1;
                    trace.line(&format!(
                        "course {course}: enrolled user {user_id} as {status}"
                    ));
                }
                Some(current) if *current != status => {
                    self.store
                        .update_enrolment_status(instance, user_id, status)
                        .await?;
                    report.updated += 1;
                    trace.line(&format!(
                        "course {course}: user {user_id} is now {status}"
                    ));
                }
                Some(_) => {}
            }
        }

        for (user_id, current) in existing {
            if touched.contains(&user_id) {
                continue;
            }
            self.apply_absence_policy(trace, instance, user_id, current, report)
                .await?;
        }

        Ok(())
    }

    /// Handle one local enrolment whose remote counterpart disappeared.
    async fn apply_absence_policy(
        &self,
        trace: &dyn SyncTrace,
        instance: &EnrolInstance,
        user_id: Uuid,
        current: EnrolmentStatus,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let course = &instance.sis_course_id;
        match instance.unenrol_action {
            UnenrolAction::Remove => {
                self.store.unenrol_user(instance, user_id).await?;
                report.unenrolled += 1;
                trace.line(&format!("course {course}: unenrolled user {user_id}"));
            }
            UnenrolAction::Suspend => {
                if current != EnrolmentStatus::Suspended {
                    self.store
                        .update_enrolment_status(instance, user_id, EnrolmentStatus::Suspended)
                        .await?;
                    report.updated += 1;
                    trace.line(&format!("course {course}: suspended user {user_id}"));
                }
            }
            UnenrolAction::SuspendNoRoles => {
                if current != EnrolmentStatus::Suspended {
                    self.store
                        .update_enrolment_status(instance, user_id, EnrolmentStatus::Suspended)
                        .await?;
                    report.updated += 1;
                    trace.line(&format!("course {course}: suspended user {user_id}"));
                }
                let removed = self.store.unassign_user_roles(instance, user_id).await?;
                report.roles_unassigned += removed;
                if removed > 0 {
                    trace.line(&format!(
                        "course {course}: removed {removed} role assignments from user {user_id}"
                    ));
                }
            }
            UnenrolAction::Keep => {
                debug!(user = %user_id, course, "absent remotely, keeping enrolment");
            }
        }
        Ok(())
    }

    /// Two set-reconciliation passes over the instances in scope:
    /// (a) grant the configured role to every active enrolment that lacks
    /// it, then (b) revoke owned assignments whose enrolment is gone or
    /// suspended, whose instance is disabled, or whose role no longer
    /// matches the instance's configuration.  Role changes are only
    /// corrected here, during sync, never mid-flight.
    async fn reconcile_roles(
        &self,
        trace: &dyn SyncTrace,
        instances: &[EnrolInstance],
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let by_id: HashMap<Uuid, &EnrolInstance> =
            instances.iter().map(|i| (i.id, i)).collect();

        let mut enrolment_status: HashMap<(Uuid, Uuid), EnrolmentStatus> = HashMap::new();
        for instance in instances {
            for enrolment in self.store.enrolments(instance.id).await? {
                enrolment_status.insert((instance.id, enrolment.user_id), enrolment.status);
            }
        }

        let mut held: HashSet<RoleAssignment> =
            self.store.role_assignments().await?.into_iter().collect();

        for instance in instances.iter().filter(|i| i.enabled) {
            let mut active: Vec<Uuid> = enrolment_status
                .iter()
                .filter(|((inst, _), status)| {
                    *inst == instance.id && **status == EnrolmentStatus::Active
                })
                .map(|((_, user), _)| *user)
                .collect();
            active.sort();

            for user_id in active {
                let wanted = RoleAssignment {
                    role_id: instance.role_id,
                    user_id,
                    course_id: instance.course_id,
                    instance_id: instance.id,
                };
                if !held.contains(&wanted) {
                    self.store.assign_role(&wanted).await?;
                    report.roles_assigned += 1;
                    trace.line(&format!(
                        "course {}: assigned role to user {user_id}",
                        instance.sis_course_id
                    ));
                    held.insert(wanted);
                }
            }
        }

        for assignment in self.store.role_assignments().await? {
            // Assignments whose instance is outside the current scope are
            // left alone; a later unfiltered run owns them.
            let Some(instance) = by_id.get(&assignment.instance_id) else {
                continue;
            };
            let enrolment = enrolment_status
                .get(&(assignment.instance_id, assignment.user_id))
                .copied();
            let stale = !instance.enabled
                || instance.role_id != assignment.role_id
                || !matches!(enrolment, Some(EnrolmentStatus::Active));
            if stale {
                self.store.unassign_role(&assignment).await?;
                report.roles_unassigned += 1;
                trace.line(&format!(
                    "course {}: removed role assignment from user {}",
                    instance.sis_course_id, assignment.user_id
                ));
            }
        }

        Ok(())
    }

    /// Prefetch the term/subject/course catalog into the long-lived cache
    /// so interactive configuration does not pay the listing cost.
    pub async fn warm_catalog_cache(
        &self,
        trace: &dyn SyncTrace,
        term_limit: usize,
    ) -> SyncResult<()> {
        if !self.client.is_logged_in().await {
            trace.error("cache warmup skipped: could not authenticate against the SIS");
            return Ok(());
        }

        let terms = self.client.get_active_terms().await?;
        for term in terms.iter().take(term_limit) {
            let subjects = self.client.get_subjects_in_term(&term.id).await?;
            let courses = self.client.get_courses_in_term(&term.id).await?;
            trace.line(&format!(
                "warmed term {}: {} subjects, {} courses",
                term.id,
                subjects.len(),
                courses.len()
            ));
        }
        Ok(())
    }

    /// Operator-facing settings check, out of the sync hot path: validate
    /// the configuration, then force a full credential round trip.
    pub async fn check_settings(&self, trace: &dyn SyncTrace) -> SyncResult<bool> {
        let findings = self.client.config().validate();
        if !findings.is_empty() {
            for finding in &findings {
                trace.error(finding);
            }
            return Ok(false);
        }

        let ok = self.client.verify_credentials().await?;
        if ok {
            trace.line("SIS credentials verified");
        } else {
            trace.error("SIS rejected the configured credentials");
        }
        Ok(ok)
    }
}
