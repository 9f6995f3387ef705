//! Rows produced by trigger queries and the notification requests built
//! from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::notification::{NotificationRequest, NotificationType, Priority, RelatedEntityType};
use crate::scheduling::LIVE_SESSION_LEAD_MINUTES;
use crate::types::{DbId, Timestamp};

/// Marker phrase carried by every live-session reminder; used for dedupe.
pub const LIVE_SESSION_MARKER: &str = "starting in";

// ---------------------------------------------------------------------------
// Assessment due
// ---------------------------------------------------------------------------

/// An enrolled student with an assessment due soon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDueRow {
    pub assessment_id: DbId,
    pub assessment_title: String,
    pub due_date: Timestamp,
    pub course_id: DbId,
    pub lesson_id: DbId,
    pub user_id: DbId,
}

impl AssessmentDueRow {
    pub fn to_request(&self, now: Timestamp) -> NotificationRequest {
        let secs = (self.due_date - now).num_seconds().max(0);
        let days = (secs + 86_399) / 86_400;
        let message = format!(
            "\"{}\" is due in {days} day{} ({})",
            self.assessment_title,
            if days == 1 { "" } else { "s" },
            self.due_date.format("%b %d, %Y")
        );
        NotificationRequest::new(
            self.user_id,
            NotificationType::Assignment,
            "Assignment Due Soon!",
            message,
        )
        .with_priority(Priority::Urgent)
        .with_action(
            format!("/courses/{}/lessons/{}", self.course_id, self.lesson_id),
            "Work on Assignment",
        )
        .with_related(RelatedEntityType::Assessment, self.assessment_id)
    }
}

// ---------------------------------------------------------------------------
// Weekly summary
// ---------------------------------------------------------------------------

/// A student's activity over the trailing week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyActivityRow {
    pub user_id: DbId,
    pub lessons_completed: i64,
    pub videos_watched: i64,
    pub assessments_submitted: i64,
    pub minutes_spent: i64,
    pub courses_active: i64,
}

impl WeeklyActivityRow {
    pub fn has_activity(&self) -> bool {
        self.lessons_completed > 0
            || self.videos_watched > 0
            || self.assessments_submitted > 0
            || self.minutes_spent > 0
    }

    pub fn to_request(&self) -> NotificationRequest {
        let message = format!(
            "This week you completed {} lesson{}, watched {} video{}, submitted {} assessment{} \
             and spent {} minute{} learning across {} active course{}.",
            self.lessons_completed,
            plural(self.lessons_completed),
            self.videos_watched,
            plural(self.videos_watched),
            self.assessments_submitted,
            plural(self.assessments_submitted),
            self.minutes_spent,
            plural(self.minutes_spent),
            self.courses_active,
            plural(self.courses_active),
        );
        NotificationRequest::new(
            self.user_id,
            NotificationType::Progress,
            "Your Weekly Progress Summary",
            message,
        )
        .with_data(serde_json::json!({
            "lessonsCompleted": self.lessons_completed,
            "videosWatched": self.videos_watched,
            "assessmentsSubmitted": self.assessments_submitted,
            "minutesSpent": self.minutes_spent,
            "coursesActive": self.courses_active,
        }))
        .with_action("/dashboard", "View Progress")
        .with_related(RelatedEntityType::Student, self.user_id)
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// ---------------------------------------------------------------------------
// Live session
// ---------------------------------------------------------------------------

/// An attendee of a live session that starts soon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSessionAttendeeRow {
    pub session_id: DbId,
    pub session_title: String,
    pub scheduled_at: Timestamp,
    pub course_id: DbId,
    pub user_id: DbId,
}

impl LiveSessionAttendeeRow {
    pub fn to_request(&self, now: Timestamp) -> NotificationRequest {
        let minutes = (self.scheduled_at - now)
            .num_minutes()
            .clamp(0, LIVE_SESSION_LEAD_MINUTES * 2);
        let message = format!(
            "\"{}\" is {LIVE_SESSION_MARKER} {minutes} minute{}",
            self.session_title,
            plural(minutes)
        );
        NotificationRequest::new(
            self.user_id,
            NotificationType::Course,
            "Live session starting soon",
            message,
        )
        .with_priority(Priority::High)
        .with_action(format!("/live-sessions/{}", self.session_id), "Join Session")
        .with_related(RelatedEntityType::LiveSession, self.session_id)
    }
}

// ---------------------------------------------------------------------------
// At-risk students
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Only high and critical students are reported to instructors.
    pub fn is_reportable(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(crate::error::CoreError::Validation(format!(
                "Unknown risk level '{other}'"
            ))),
        }
    }
}

/// One at-risk student in one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtRiskStudentRow {
    pub student_id: DbId,
    pub course_id: DbId,
    pub course_title: String,
    pub instructor_id: DbId,
    pub risk_level: RiskLevel,
}

/// All reportable at-risk students of one instructor in one course.
#[derive(Debug, Clone, PartialEq)]
pub struct AtRiskGroup {
    pub instructor_id: DbId,
    pub course_id: DbId,
    pub course_title: String,
    pub critical: usize,
    pub high: usize,
}

/// Collapse per-student rows into one group per instructor per course.
/// Rows below the reportable threshold are dropped.
pub fn group_at_risk(rows: &[AtRiskStudentRow]) -> Vec<AtRiskGroup> {
    let mut groups: BTreeMap<(DbId, DbId), AtRiskGroup> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.risk_level.is_reportable()) {
        let group = groups
            .entry((row.instructor_id, row.course_id))
            .or_insert_with(|| AtRiskGroup {
                instructor_id: row.instructor_id,
                course_id: row.course_id,
                course_title: row.course_title.clone(),
                critical: 0,
                high: 0,
            });
        match row.risk_level {
            RiskLevel::Critical => group.critical += 1,
            _ => group.high += 1,
        }
    }
    groups.into_values().collect()
}

impl AtRiskGroup {
    pub fn total(&self) -> usize {
        self.critical + self.high
    }

    pub fn to_request(&self) -> NotificationRequest {
        let total = self.total();
        let priority = if self.critical > 0 {
            Priority::Urgent
        } else {
            Priority::High
        };
        let message = format!(
            "{total} student{} at risk in {} ({} critical, {} high)",
            if total == 1 { "" } else { "s" },
            self.course_title,
            self.critical,
            self.high
        );
        NotificationRequest::new(
            self.instructor_id,
            NotificationType::Risk,
            "Students need attention",
            message,
        )
        .with_priority(priority)
        .with_data(serde_json::json!({
            "critical": self.critical,
            "high": self.high,
        }))
        .with_action(
            format!("/instructor/courses/{}/at-risk", self.course_id),
            "Review Students",
        )
        .with_related(RelatedEntityType::Course, self.course_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
