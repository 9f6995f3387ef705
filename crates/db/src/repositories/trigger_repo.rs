//! Trigger queries over platform tables owned by other subsystems.
//!
//! Expected columns:
//!
//! | Table                      | Columns used                                        |
//! |----------------------------|-----------------------------------------------------|
//! | `courses`                  | `id`, `title`, `instructor_id`                      |
//! | `lessons`                  | `id`, `course_id`                                   |
//! | `enrollments`              | `user_id`, `course_id`, `status`                    |
//! | `assessments`              | `id`, `lesson_id`, `title`, `due_date`              |
//! | `assessment_submissions`   | `assessment_id`, `user_id`, `status`, `completed_at`|
//! | `user_progress`            | `user_id`, `completed_at`, `last_accessed_at`, `time_spent_minutes` |
//! | `video_progress`           | `user_id`, `is_completed`, `completed_at`           |
//! | `live_sessions`            | `id`, `course_id`, `title`, `scheduled_at`, `status`|
//! | `live_session_attendees`   | `session_id`, `user_id`                             |
//! | `student_risk_assessments` | `student_id`, `course_id`, `risk_level`             |

use sqlx::PgPool;

use coursecast_core::types::Timestamp;

use crate::models::trigger::{
    AssessmentDueDbRow, AtRiskStudentDbRow, LiveSessionAttendeeDbRow, WeeklyActivityDbRow,
};

pub struct TriggerRepo;

impl TriggerRepo {
    /// Active enrollees of assessments due in `[from, to)` that they have
    /// not completed yet.
    pub async fn assessments_due_between(
        pool: &PgPool,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<AssessmentDueDbRow>, sqlx::Error> {
        sqlx::query_as::<_, AssessmentDueDbRow>(
            "SELECT a.id AS assessment_id, a.title AS assessment_title, a.due_date, \
                    l.course_id, l.id AS lesson_id, e.user_id \
             FROM assessments a \
             JOIN lessons l ON l.id = a.lesson_id \
             JOIN enrollments e ON e.course_id = l.course_id AND e.status = 'active' \
             WHERE a.due_date >= $1 AND a.due_date < $2 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM assessment_submissions s \
                   WHERE s.assessment_id = a.id AND s.user_id = e.user_id \
                     AND s.status = 'completed') \
             ORDER BY a.due_date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Per-student activity counters over `[since, until)`.
    pub async fn weekly_activity(
        pool: &PgPool,
        since: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<WeeklyActivityDbRow>, sqlx::Error> {
        sqlx::query_as::<_, WeeklyActivityDbRow>(
            "SELECT e.user_id, \
                (SELECT COUNT(*) FROM user_progress p \
                  WHERE p.user_id = e.user_id AND p.completed_at >= $1 AND p.completed_at < $2 \
                )::BIGINT AS lessons_completed, \
                (SELECT COUNT(*) FROM video_progress v \
                  WHERE v.user_id = e.user_id AND v.is_completed \
                    AND v.completed_at >= $1 AND v.completed_at < $2 \
                )::BIGINT AS videos_watched, \
                (SELECT COUNT(*) FROM assessment_submissions s \
                  WHERE s.user_id = e.user_id AND s.status = 'completed' \
                    AND s.completed_at >= $1 AND s.completed_at < $2 \
                )::BIGINT AS assessments_submitted, \
                (SELECT COALESCE(SUM(p.time_spent_minutes), 0) FROM user_progress p \
                  WHERE p.user_id = e.user_id \
                    AND p.last_accessed_at >= $1 AND p.last_accessed_at < $2 \
                )::BIGINT AS minutes_spent, \
                COUNT(DISTINCT e.course_id)::BIGINT AS courses_active \
             FROM enrollments e \
             WHERE e.status = 'active' \
             GROUP BY e.user_id",
        )
        .bind(since)
        .bind(until)
        .fetch_all(pool)
        .await
    }

    /// Attendees of scheduled sessions starting in `[from, to]`.
    pub async fn live_sessions_starting_between(
        pool: &PgPool,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<LiveSessionAttendeeDbRow>, sqlx::Error> {
        sqlx::query_as::<_, LiveSessionAttendeeDbRow>(
            "SELECT ls.id AS session_id, ls.title AS session_title, ls.scheduled_at, \
                    ls.course_id, a.user_id \
             FROM live_sessions ls \
             JOIN live_session_attendees a ON a.session_id = ls.id \
             WHERE ls.status = 'scheduled' AND ls.scheduled_at BETWEEN $1 AND $2 \
             ORDER BY ls.scheduled_at",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Students currently assessed as high or critical risk.
    pub async fn at_risk_students(pool: &PgPool) -> Result<Vec<AtRiskStudentDbRow>, sqlx::Error> {
        sqlx::query_as::<_, AtRiskStudentDbRow>(
            "SELECT sr.student_id, sr.course_id, c.title AS course_title, c.instructor_id, \
                    sr.risk_level \
             FROM student_risk_assessments sr \
             JOIN courses c ON c.id = sr.course_id \
             WHERE sr.risk_level IN ('high', 'critical') \
             ORDER BY c.instructor_id, sr.course_id",
        )
        .fetch_all(pool)
        .await
    }
}
