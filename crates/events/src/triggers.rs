//! Scheduled notification triggers.
//!
//! Each job queries [`TriggerSource`] for a condition and hands one request
//! per match to the dispatcher, so category toggles and quiet hours apply to
//! triggered notifications like any other.
//!
//! | Job                           | Cadence (UTC)     | Dedupe                                        |
//! |-------------------------------|-------------------|-----------------------------------------------|
//! | `assessment-due`              | daily 09:00       | same assessment reminded in last 2 days       |
//! | `weekly-summary`              | Monday 09:00      | summary for the same student in last 6 days   |
//! | `live-session-starting-soon`  | every 15 min      | "starting in" for the session in last 2 h     |
//! | `at-risk-students`            | Monday 10:00      | report for the same course in last 6 days     |
//!
//! Dedupe looks at stored notifications and the deferred queue, so a manual
//! run right after a scheduled one dispatches nothing new.

use std::sync::Arc;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use coursecast_core::clock::Clock;
use coursecast_core::notification::{
    DedupeQuery, NotificationRequest, NotificationType, RelatedEntity, RelatedEntityType,
};
use coursecast_core::scheduling::{
    TriggerJob, ASSESSMENT_DUE_DAYS_AHEAD, LIVE_SESSION_DEDUPE_HOURS, LIVE_SESSION_LEAD_MINUTES,
    LIVE_SESSION_WINDOW_MINUTES, WEEKLY_DEDUPE_DAYS, WEEKLY_SUMMARY_DAYS,
};
use coursecast_core::triggers::{group_at_risk, LIVE_SESSION_MARKER};
use coursecast_core::types::{DbId, Timestamp};
use coursecast_db::store::{DeferredQueueStore, NotificationStore, TriggerSource};

use crate::dispatcher::NotificationDispatcher;
use crate::error::NotificationResult;
use crate::guard::InFlightGuard;

/// Runs the scheduled trigger jobs.
pub struct TriggerRunner {
    source: Arc<dyn TriggerSource>,
    notifications: Arc<dyn NotificationStore>,
    deferred: Arc<dyn DeferredQueueStore>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    guards: [InFlightGuard; 4],
}

impl TriggerRunner {
    pub fn new(
        source: Arc<dyn TriggerSource>,
        notifications: Arc<dyn NotificationStore>,
        deferred: Arc<dyn DeferredQueueStore>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            notifications,
            deferred,
            dispatcher,
            clock,
            guards: Default::default(),
        }
    }

    fn guard(&self, job: TriggerJob) -> &InFlightGuard {
        let index = match job {
            TriggerJob::AssessmentDue => 0,
            TriggerJob::WeeklySummary => 1,
            TriggerJob::LiveSessionStartingSoon => 2,
            TriggerJob::AtRiskStudents => 3,
        };
        &self.guards[index]
    }

    /// Run one job immediately. Returns the number of requests the
    /// dispatcher accepted (created or deferred).
    pub async fn run_job_now(&self, job: TriggerJob) -> NotificationResult<usize> {
        let Some(_permit) = self.guard(job).try_begin() else {
            tracing::warn!(job = job.as_str(), "Trigger job already running, skipping");
            return Ok(0);
        };

        let now = self.clock.now();
        let requests = match job {
            TriggerJob::AssessmentDue => self.assessment_due_requests(now).await?,
            TriggerJob::WeeklySummary => self.weekly_summary_requests(now).await?,
            TriggerJob::LiveSessionStartingSoon => self.live_session_requests(now).await?,
            TriggerJob::AtRiskStudents => self.at_risk_requests(now).await?,
        };

        if requests.is_empty() {
            tracing::debug!(job = job.as_str(), "Trigger job found no matches");
            return Ok(0);
        }

        let matches = requests.len();
        let mut dispatched = 0;
        for request in requests {
            let user_id = request.user_id;
            match self.dispatcher.create(request).await {
                Ok(outcome) if !outcome.is_suppressed() => dispatched += 1,
                Ok(_) => {}
                Err(e) => tracing::error!(
                    job = job.as_str(),
                    user_id = %user_id,
                    error = %e,
                    "Failed to dispatch triggered notification"
                ),
            }
        }

        tracing::info!(job = job.as_str(), matches, dispatched, "Trigger job completed");
        Ok(dispatched)
    }

    async fn assessment_due_requests(
        &self,
        now: Timestamp,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        let window = Duration::days(ASSESSMENT_DUE_DAYS_AHEAD);
        let rows = self
            .source
            .assessments_due_between(now, now + window)
            .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let dedupe = DedupeQuery {
                user_id: row.user_id,
                notification_type: Some(NotificationType::Assignment),
                related_entity: RelatedEntity {
                    entity_type: RelatedEntityType::Assessment,
                    id: row.assessment_id,
                },
                message_contains: None,
                created_since: now - window,
            };
            if !self.already_notified(&dedupe).await? {
                requests.push(row.to_request(now));
            }
        }
        Ok(requests)
    }

    async fn weekly_summary_requests(
        &self,
        now: Timestamp,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        let since = now - Duration::days(WEEKLY_SUMMARY_DAYS);
        let rows = self.source.weekly_activity(since, now).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows.iter().filter(|row| row.has_activity()) {
            let dedupe = weekly_dedupe(
                row.user_id,
                NotificationType::Progress,
                RelatedEntityType::Student,
                row.user_id,
                now,
            );
            if !self.already_notified(&dedupe).await? {
                requests.push(row.to_request());
            }
        }
        Ok(requests)
    }

    async fn live_session_requests(
        &self,
        now: Timestamp,
    ) -> NotificationResult<Vec<NotificationRequest>> {
        let lead = Duration::minutes(LIVE_SESSION_LEAD_MINUTES);
        let window = Duration::minutes(LIVE_SESSION_WINDOW_MINUTES);
        let rows = self
            .source
            .live_sessions_starting_between(now + lead - window, now + lead + window)
            .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let dedupe = live_session_dedupe(row.user_id, row.session_id, now);
            if !self.already_notified(&dedupe).await? {
                requests.push(row.to_request(now));
            }
        }
        Ok(requests)
    }

    async fn at_risk_requests(&self, now: Timestamp) -> NotificationResult<Vec<NotificationRequest>> {
        let rows = self.source.at_risk_students().await?;

        let mut requests = Vec::new();
        for group in group_at_risk(&rows) {
            let dedupe = weekly_dedupe(
                group.instructor_id,
                NotificationType::Risk,
                RelatedEntityType::Course,
                group.course_id,
                now,
            );
            if !self.already_notified(&dedupe).await? {
                requests.push(group.to_request());
            }
        }
        Ok(requests)
    }

    /// A reminder counts as sent once it is stored or still held in the
    /// deferred queue.
    async fn already_notified(&self, dedupe: &DedupeQuery) -> NotificationResult<bool> {
        if self.notifications.exists_matching(dedupe).await? {
            return Ok(true);
        }
        Ok(self.deferred.exists_queued_matching(dedupe).await?)
    }

    /// Run `job` on its cadence until `cancel` fires.
    pub async fn run(&self, job: TriggerJob, cancel: CancellationToken) {
        loop {
            let delay = job.cadence().delay_from(self.clock.now());

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job = job.as_str(), "Trigger job cancelled");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = self.run_job_now(job).await {
                        tracing::error!(job = job.as_str(), error = %e, "Trigger job failed");
                    }
                }
            }
        }
    }
}

fn weekly_dedupe(
    user_id: DbId,
    notification_type: NotificationType,
    entity_type: RelatedEntityType,
    entity_id: DbId,
    now: Timestamp,
) -> DedupeQuery {
    DedupeQuery {
        user_id,
        notification_type: Some(notification_type),
        related_entity: RelatedEntity {
            entity_type,
            id: entity_id,
        },
        message_contains: None,
        created_since: now - Duration::days(WEEKLY_DEDUPE_DAYS),
    }
}

fn live_session_dedupe(user_id: DbId, session_id: DbId, now: Timestamp) -> DedupeQuery {
    DedupeQuery {
        user_id,
        notification_type: None,
        related_entity: RelatedEntity {
            entity_type: RelatedEntityType::LiveSession,
            id: session_id,
        },
        message_contains: Some(LIVE_SESSION_MARKER.to_string()),
        created_since: now - Duration::hours(LIVE_SESSION_DEDUPE_HOURS),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use coursecast_core::notification::Priority;
    use coursecast_core::preferences::PreferencesPatch;
    use coursecast_core::triggers::{
        AssessmentDueRow, AtRiskStudentRow, LiveSessionAttendeeRow, RiskLevel, WeeklyActivityRow,
    };
    use coursecast_core::types::new_id;

    use crate::testing::Harness;

    fn session_for(h: &Harness, user: DbId, starts_in: Duration) -> LiveSessionAttendeeRow {
        LiveSessionAttendeeRow {
            session_id: new_id(),
            session_title: "Office hours".into(),
            scheduled_at: h.clock.now() + starts_in,
            course_id: new_id(),
            user_id: user,
        }
    }

    fn weekly(user: DbId, lessons: i64) -> WeeklyActivityRow {
        WeeklyActivityRow {
            user_id: user,
            lessons_completed: lessons,
            videos_watched: 0,
            assessments_submitted: 0,
            minutes_spent: 0,
            courses_active: 1,
        }
    }

    #[tokio::test]
    async fn live_session_reminder_is_not_repeated() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        h.store
            .set_live_sessions(vec![session_for(&h, user, Duration::minutes(16))]);

        let first = h
            .core
            .triggers
            .run_job_now(TriggerJob::LiveSessionStartingSoon)
            .await
            .unwrap();
        let second = h
            .core
            .triggers
            .run_job_now(TriggerJob::LiveSessionStartingSoon)
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        let stored = h.store.notifications();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].message.contains(LIVE_SESSION_MARKER));
    }

    #[tokio::test]
    async fn live_session_dedupe_sees_deferred_reminders() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        let patch: PreferencesPatch = serde_json::from_value(serde_json::json!({
            "quietHoursStart": "09:00",
            "quietHoursEnd": "11:00"
        }))
        .unwrap();
        h.core.preferences.update(user, &patch).await.unwrap();
        h.store
            .set_live_sessions(vec![session_for(&h, user, Duration::minutes(15))]);

        h.core
            .triggers
            .run_job_now(TriggerJob::LiveSessionStartingSoon)
            .await
            .unwrap();
        h.core
            .triggers
            .run_job_now(TriggerJob::LiveSessionStartingSoon)
            .await
            .unwrap();

        assert_eq!(h.store.deferred_entries().len(), 1);
        assert!(h.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn sessions_outside_the_window_are_ignored() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        h.store.set_live_sessions(vec![
            session_for(&h, user, Duration::minutes(5)),
            session_for(&h, user, Duration::minutes(40)),
        ]);

        let dispatched = h
            .core
            .triggers
            .run_job_now(TriggerJob::LiveSessionStartingSoon)
            .await
            .unwrap();
        assert_eq!(dispatched, 0);
    }

    #[tokio::test]
    async fn assessment_reminder_covers_next_two_days_once() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        let row = |hours: i64| AssessmentDueRow {
            assessment_id: new_id(),
            assessment_title: "Quiz".into(),
            due_date: h.clock.now() + Duration::hours(hours),
            course_id: new_id(),
            lesson_id: new_id(),
            user_id: user,
        };
        h.store
            .set_assessments_due(vec![row(12), row(36), row(60)]);

        assert_eq!(
            h.core.triggers.run_job_now(TriggerJob::AssessmentDue).await.unwrap(),
            2
        );
        assert_eq!(
            h.core.triggers.run_job_now(TriggerJob::AssessmentDue).await.unwrap(),
            0
        );
        let stored = h.store.notifications();
        assert_eq!(stored[0].notification_type, NotificationType::Assignment);
        assert_eq!(stored[0].priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn assessment_is_not_reminded_again_the_next_day() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        h.store.set_assessments_due(vec![AssessmentDueRow {
            assessment_id: new_id(),
            assessment_title: "Final".into(),
            due_date: h.clock.now() + Duration::hours(40),
            course_id: new_id(),
            lesson_id: new_id(),
            user_id: user,
        }]);

        h.core.triggers.run_job_now(TriggerJob::AssessmentDue).await.unwrap();
        h.clock.advance(Duration::days(1));
        let next_day = h
            .core
            .triggers
            .run_job_now(TriggerJob::AssessmentDue)
            .await
            .unwrap();

        assert_eq!(next_day, 0);
        assert_eq!(h.store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn weekly_summary_skips_inactive_users() {
        let h = Harness::new();
        let active = h.add_user("ada@example.com", "Ada");
        let idle = h.add_user("bob@example.com", "Bob");
        h.store
            .set_weekly_activity(vec![weekly(active, 3), weekly(idle, 0)]);

        let dispatched = h
            .core
            .triggers
            .run_job_now(TriggerJob::WeeklySummary)
            .await
            .unwrap();
        assert_eq!(dispatched, 1);
        assert_eq!(h.store.notifications()[0].user_id, active);
    }

    #[tokio::test]
    async fn at_risk_students_are_grouped_per_instructor_course() {
        let h = Harness::new();
        let instructor = h.add_user("prof@example.com", "Grace");
        let course = new_id();
        let student = |level| AtRiskStudentRow {
            student_id: new_id(),
            course_id: course,
            course_title: "Rust 101".into(),
            instructor_id: instructor,
            risk_level: level,
        };
        h.store.set_at_risk_students(vec![
            student(RiskLevel::Critical),
            student(RiskLevel::High),
            student(RiskLevel::High),
            student(RiskLevel::Low),
        ]);

        let dispatched = h
            .core
            .triggers
            .run_job_now(TriggerJob::AtRiskStudents)
            .await
            .unwrap();
        assert_eq!(dispatched, 1);

        let stored = h.store.notifications();
        assert_eq!(stored[0].user_id, instructor);
        assert_eq!(stored[0].priority, Priority::Urgent);
        assert_eq!(
            stored[0].message,
            "3 students at risk in Rust 101 (1 critical, 2 high)"
        );
    }

    #[tokio::test]
    async fn weekly_summary_is_sent_once_per_week() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        h.store.set_weekly_activity(vec![weekly(user, 3)]);

        let first = h
            .core
            .triggers
            .run_job_now(TriggerJob::WeeklySummary)
            .await
            .unwrap();
        let rerun = h
            .core
            .triggers
            .run_job_now(TriggerJob::WeeklySummary)
            .await
            .unwrap();
        assert_eq!((first, rerun), (1, 0));
        assert_eq!(h.store.notifications().len(), 1);

        h.clock.advance(Duration::days(7));
        let next_week = h
            .core
            .triggers
            .run_job_now(TriggerJob::WeeklySummary)
            .await
            .unwrap();
        assert_eq!(next_week, 1);
        assert_eq!(h.store.notifications().len(), 2);
    }

    #[tokio::test]
    async fn at_risk_report_is_sent_once_per_week() {
        let h = Harness::new();
        let instructor = h.add_user("prof@example.com", "Grace");
        let (algebra, physics) = (new_id(), new_id());
        let student = |course| AtRiskStudentRow {
            student_id: new_id(),
            course_id: course,
            course_title: "Rust 101".into(),
            instructor_id: instructor,
            risk_level: RiskLevel::Critical,
        };
        h.store.set_at_risk_students(vec![student(algebra)]);

        let first = h
            .core
            .triggers
            .run_job_now(TriggerJob::AtRiskStudents)
            .await
            .unwrap();
        assert_eq!(first, 1);

        // A second course of the same instructor is still reported.
        h.store
            .set_at_risk_students(vec![student(algebra), student(physics)]);
        let rerun = h
            .core
            .triggers
            .run_job_now(TriggerJob::AtRiskStudents)
            .await
            .unwrap();
        assert_eq!(rerun, 1);
        assert_eq!(h.store.notifications().len(), 2);

        h.clock.advance(Duration::days(7));
        let next_week = h
            .core
            .triggers
            .run_job_now(TriggerJob::AtRiskStudents)
            .await
            .unwrap();
        assert_eq!(next_week, 2);
    }

    #[tokio::test]
    async fn suppressed_requests_are_not_counted() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        let patch: PreferencesPatch =
            serde_json::from_value(serde_json::json!({ "enableProgressNotifications": false }))
                .unwrap();
        h.core.preferences.update(user, &patch).await.unwrap();
        h.store.set_weekly_activity(vec![weekly(user, 2)]);

        let dispatched = h
            .core
            .triggers
            .run_job_now(TriggerJob::WeeklySummary)
            .await
            .unwrap();
        assert_eq!(dispatched, 0);
        assert!(h.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn no_matches_dispatch_nothing() {
        let h = Harness::new();
        for job in TriggerJob::ALL {
            assert_eq!(h.core.triggers.run_job_now(job).await.unwrap(), 0);
        }
    }
}
