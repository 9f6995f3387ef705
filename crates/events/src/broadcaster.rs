//! Course change events for connected clients.
//!
//! Three event kinds, all sent to the course's room and the catalog room:
//!
//! - `course:updated` is debounced. Changes to one course within
//!   [`COURSE_UPDATE_DEBOUNCE`] of each other go out as a single event
//!   carrying every changed field.
//! - `course:catalog-changed` and `course:enrollment-changed` go out
//!   immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexSet;
use tokio::task::JoinHandle;

use coursecast_core::channels::{course_room, ROOM_COURSES_CATALOG};
use coursecast_core::clock::Clock;
use coursecast_core::course_event::{
    CatalogAction, CourseCatalogChangedPayload, CourseEnrollmentChangedPayload,
    CourseUpdatedPayload,
};
use coursecast_core::types::DbId;

use crate::delivery::realtime::{RealtimeEvent, RealtimeTransport};
use crate::delivery::DeliveryError;

/// Quiet period after the last change before `course:updated` is sent.
pub const COURSE_UPDATE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Fields accumulated for one course and the timer that will flush them.
struct PendingUpdate {
    fields: IndexSet<String>,
    generation: u64,
    timer: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<DbId, PendingUpdate>>>;

fn lock(pending: &Mutex<HashMap<DbId, PendingUpdate>>) -> MutexGuard<'_, HashMap<DbId, PendingUpdate>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn course_rooms(course_id: DbId) -> [String; 2] {
    [course_room(course_id), ROOM_COURSES_CATALOG.to_string()]
}

pub struct CourseEventBroadcaster {
    transport: Arc<dyn RealtimeTransport>,
    clock: Arc<dyn Clock>,
    pending: PendingMap,
    next_generation: AtomicU64,
}

impl CourseEventBroadcaster {
    pub fn new(transport: Arc<dyn RealtimeTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Record changed fields of a course and (re)start its debounce timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn emit_course_updated<I, S>(&self, course_id: DbId, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.pending);

        let timer = self.spawn_flush_timer(course_id, generation);
        match pending.get_mut(&course_id) {
            Some(update) => {
                update.fields.extend(fields.into_iter().map(Into::into));
                update.timer.abort();
                update.timer = timer;
                update.generation = generation;
            }
            None => {
                pending.insert(
                    course_id,
                    PendingUpdate {
                        fields: fields.into_iter().map(Into::into).collect(),
                        generation,
                        timer,
                    },
                );
            }
        }
    }

    fn spawn_flush_timer(&self, course_id: DbId, generation: u64) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let transport = Arc::clone(&self.transport);
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            tokio::time::sleep(COURSE_UPDATE_DEBOUNCE).await;

            // A newer call may have replaced this timer after it woke.
            let fields = {
                let mut pending = lock(&pending);
                match pending.get(&course_id) {
                    Some(update) if update.generation == generation => {
                        pending.remove(&course_id).map(|u| u.fields)
                    }
                    _ => None,
                }
            };

            if let Some(fields) = fields {
                send_course_updated(transport.as_ref(), clock.as_ref(), course_id, fields).await;
            }
        })
    }

    pub async fn emit_catalog_changed(&self, action: CatalogAction, course_id: DbId) {
        let payload = CourseCatalogChangedPayload {
            action,
            course_id,
            timestamp: self.clock.now(),
        };
        let result = match RealtimeEvent::catalog_changed(&payload) {
            Ok(event) => self.transport.emit(&course_rooms(course_id), &event).await,
            Err(e) => Err(e),
        };
        log_emit("course:catalog-changed", course_id, result);
    }

    pub async fn emit_enrollment_changed(&self, course_id: DbId) {
        let payload = CourseEnrollmentChangedPayload {
            course_id,
            timestamp: self.clock.now(),
        };
        let result = match RealtimeEvent::enrollment_changed(&payload) {
            Ok(event) => self.transport.emit(&course_rooms(course_id), &event).await,
            Err(e) => Err(e),
        };
        log_emit("course:enrollment-changed", course_id, result);
    }

    /// Subscribe every live connection of a newly enrolled user to the
    /// course room.
    pub async fn join_room(&self, user_id: DbId, course_id: DbId) -> Result<usize, DeliveryError> {
        let joined = self
            .transport
            .join_user_to_room(user_id, &course_room(course_id))
            .await?;
        tracing::debug!(
            user_id = %user_id,
            course_id = %course_id,
            connections = joined,
            "User joined course room"
        );
        Ok(joined)
    }

    /// Courses with a debounce window still open.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Send every pending `course:updated` now and clear the debounce state.
    /// Returns the number of events flushed.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(DbId, IndexSet<String>)> = lock(&self.pending)
            .drain()
            .map(|(course_id, update)| {
                update.timer.abort();
                (course_id, update.fields)
            })
            .collect();

        let flushed = drained.len();
        for (course_id, fields) in drained {
            send_course_updated(self.transport.as_ref(), self.clock.as_ref(), course_id, fields)
                .await;
        }
        if flushed > 0 {
            tracing::info!(flushed, "Flushed pending course updates on shutdown");
        }
        flushed
    }
}

async fn send_course_updated(
    transport: &dyn RealtimeTransport,
    clock: &dyn Clock,
    course_id: DbId,
    fields: IndexSet<String>,
) {
    let payload = CourseUpdatedPayload {
        course_id,
        fields: fields.into_iter().collect(),
        timestamp: clock.now(),
    };
    let result = match RealtimeEvent::course_updated(&payload) {
        Ok(event) => transport.emit(&course_rooms(course_id), &event).await,
        Err(e) => Err(e),
    };
    log_emit("course:updated", course_id, result);
}

fn log_emit(event: &'static str, course_id: DbId, result: Result<usize, DeliveryError>) {
    match result {
        Ok(connections) => {
            tracing::info!(event, course_id = %course_id, connections, "Course event emitted")
        }
        Err(e) => tracing::warn!(
            event,
            course_id = %course_id,
            error = %e,
            "Course event emit failed"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
