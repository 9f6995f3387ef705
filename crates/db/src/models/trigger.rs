//! Row models for the trigger queries over platform tables.

use sqlx::FromRow;

use coursecast_core::triggers::{
    AssessmentDueRow, AtRiskStudentRow, LiveSessionAttendeeRow, WeeklyActivityRow,
};
use coursecast_core::types::{DbId, Timestamp};

use crate::error::StoreError;

#[derive(Debug, Clone, FromRow)]
pub struct AssessmentDueDbRow {
    pub assessment_id: DbId,
    pub assessment_title: String,
    pub due_date: Timestamp,
    pub course_id: DbId,
    pub lesson_id: DbId,
    pub user_id: DbId,
}

impl From<AssessmentDueDbRow> for AssessmentDueRow {
    fn from(row: AssessmentDueDbRow) -> Self {
        AssessmentDueRow {
            assessment_id: row.assessment_id,
            assessment_title: row.assessment_title,
            due_date: row.due_date,
            course_id: row.course_id,
            lesson_id: row.lesson_id,
            user_id: row.user_id,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WeeklyActivityDbRow {
    pub user_id: DbId,
    pub lessons_completed: i64,
    pub videos_watched: i64,
    pub assessments_submitted: i64,
    pub minutes_spent: i64,
    pub courses_active: i64,
}

impl From<WeeklyActivityDbRow> for WeeklyActivityRow {
    fn from(row: WeeklyActivityDbRow) -> Self {
        WeeklyActivityRow {
            user_id: row.user_id,
            lessons_completed: row.lessons_completed,
            videos_watched: row.videos_watched,
            assessments_submitted: row.assessments_submitted,
            minutes_spent: row.minutes_spent,
            courses_active: row.courses_active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LiveSessionAttendeeDbRow {
    pub session_id: DbId,
    pub session_title: String,
    pub scheduled_at: Timestamp,
    pub course_id: DbId,
    pub user_id: DbId,
}

impl From<LiveSessionAttendeeDbRow> for LiveSessionAttendeeRow {
    fn from(row: LiveSessionAttendeeDbRow) -> Self {
        LiveSessionAttendeeRow {
            session_id: row.session_id,
            session_title: row.session_title,
            scheduled_at: row.scheduled_at,
            course_id: row.course_id,
            user_id: row.user_id,
        }
    }
}

/// `risk_level` as stored; parsed into [`coursecast_core::triggers::RiskLevel`].
#[derive(Debug, Clone, FromRow)]
pub struct AtRiskStudentDbRow {
    pub student_id: DbId,
    pub course_id: DbId,
    pub course_title: String,
    pub instructor_id: DbId,
    pub risk_level: String,
}

impl TryFrom<AtRiskStudentDbRow> for AtRiskStudentRow {
    type Error = StoreError;

    fn try_from(row: AtRiskStudentDbRow) -> Result<Self, Self::Error> {
        Ok(AtRiskStudentRow {
            student_id: row.student_id,
            course_id: row.course_id,
            course_title: row.course_title,
            instructor_id: row.instructor_id,
            risk_level: row.risk_level.parse()?,
        })
    }
}
