//! SIS wire types and the enrolment reduction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An academic term as returned by the SIS.
///
/// A term without an enrolment file date is not yet open for file-based
/// enrolment and is irrelevant to synchronisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    /// Opaque SIS term id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Date enrolment files open for this term, if any.
    #[serde(default)]
    pub file_date_for_enrollment: Option<String>,
    /// Term start date, used only for remote-side sorting.
    #[serde(default)]
    pub term_start_date: Option<String>,
}

impl Term {
    /// Whether this term is open for file-based enrolment.
    pub fn is_open_for_enrolment(&self) -> bool {
        self.file_date_for_enrollment
            .as_deref()
            .is_some_and(|date| !date.is_empty())
    }
}

/// A subject within a term.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Opaque SIS subject id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// A course within a term.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SisCourse {
    /// Opaque SIS course id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Catalog course number.
    #[serde(default)]
    pub course_number: String,
    /// Term the course belongs to.
    #[serde(default)]
    pub term: String,
}

/// One raw enrolment record from the SIS, before reduction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseEnrollment {
    /// The enrolled student, when present.
    #[serde(default)]
    pub student: Option<EnrolledStudent>,
    /// Raw status code: `A`ctive, `I`nactive, or a discarded terminal state.
    #[serde(default)]
    pub status: Option<String>,
}

/// Student subrecord of an enrolment record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrolledStudent {
    /// External person id the LMS resolves to a local user.
    #[serde(default)]
    pub empno: Option<String>,
}

/// Reduced enrolment status for one person, as the reconciler consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrolmentStatus {
    /// Actively enrolled.
    Active,
    /// Enrolled but suspended.
    Suspended,
}

impl std::fmt::Display for EnrolmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrolmentStatus::Active => write!(f, "active"),
            EnrolmentStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// Collapse raw enrolment records into one current status per external id.
///
/// Precedence: `A` always wins and overwrites any prior entry for that
/// person; `I` is recorded only when no entry exists yet, so an `Active`
/// seen earlier in the page set is never downgraded; every other status is
/// a terminal state (dropped, failed) and is discarded outright.
pub fn reduce_enrollment_records(
    records: impl IntoIterator<Item = CourseEnrollment>,
) -> HashMap<String, EnrolmentStatus> {
    let mut reduced = HashMap::new();
    for record in records {
        let Some(empno) = record.student.as_ref().and_then(|s| s.empno.as_deref()) else {
            continue;
        };
        let empno = empno.trim();
        if empno.is_empty() {
            continue;
        }
        match record.status.as_deref() {
            Some("A") => {
                reduced.insert(empno.to_string(), EnrolmentStatus::Active);
            }
            Some("I") => {
                reduced
                    .entry(empno.to_string())
                    .or_insert(EnrolmentStatus::Suspended);
            }
            _ => {}
        }
    }
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(empno: &str, status: &str) -> CourseEnrollment {
        CourseEnrollment {
            student: Some(EnrolledStudent {
                empno: Some(empno.to_string()),
            }),
            status: Some(status.to_string()),
        }
    }

    #[test]
    fn active_wins_regardless_of_order() {
        let reduced = reduce_enrollment_records(vec![record("p1", "A"), record("p1", "I")]);
        assert_eq!(reduced.get("p1"), Some(&EnrolmentStatus::Active));

        let reduced = reduce_enrollment_records(vec![record("p1", "I"), record("p1", "A")]);
        assert_eq!(reduced.get("p1"), Some(&EnrolmentStatus::Active));
    }

    #[test]
    fn lone_inactive_maps_to_suspended() {
        let reduced = reduce_enrollment_records(vec![record("p1", "I")]);
        assert_eq!(reduced.get("p1"), Some(&EnrolmentStatus::Suspended));
    }

    #[test]
    fn terminal_statuses_are_discarded() {
        let reduced =
            reduce_enrollment_records(vec![record("p1", "S"), record("p2", "F"), record("p3", "X")]);
        assert!(reduced.is_empty());
    }

    #[test]
    fn records_without_an_external_id_are_skipped() {
        let reduced = reduce_enrollment_records(vec![
            CourseEnrollment {
                student: None,
                status: Some("A".into()),
            },
            CourseEnrollment {
                student: Some(EnrolledStudent {
                    empno: Some("   ".into()),
                }),
                status: Some("A".into()),
            },
        ]);
        assert!(reduced.is_empty());
    }

    #[test]
    fn external_ids_are_trimmed() {
        let reduced = reduce_enrollment_records(vec![record(" p1 ", "A")]);
        assert_eq!(reduced.get("p1"), Some(&EnrolmentStatus::Active));
    }

    #[test]
    fn term_openness_requires_a_file_date() {
        let open: Term = serde_json::from_str(
            r#"{"id":"T1","name":"Spring","fileDateForEnrollment":"2026-01-15"}"#,
        )
        .unwrap();
        assert!(open.is_open_for_enrolment());

        let closed: Term =
            serde_json::from_str(r#"{"id":"T2","name":"Summer","fileDateForEnrollment":null}"#)
                .unwrap();
        assert!(!closed.is_open_for_enrolment());
    }
}
