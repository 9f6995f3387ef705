//! Recording channel doubles and a wired-up harness, shared by this crate's
//! tests and the HTTP layer's integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use coursecast_core::clock::{Clock, ManualClock};
use coursecast_core::quiet_hours::QuietHoursClock;
use coursecast_core::types::{new_id, DbId};
use coursecast_db::store::{Recipient, Stores};
use coursecast_db::InMemoryStore;

use crate::config::DeliveryConfig;
use crate::delivery::email::{EmailError, EmailLinks, EmailMessage, EmailSender};
use crate::delivery::realtime::{RealtimeEvent, RealtimeTransport};
use crate::delivery::DeliveryError;
use crate::NotificationCore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }

    /// While set, every send fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::Build("recording sender set to fail".into()));
        }
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub rooms: Vec<String>,
    pub event: RealtimeEvent,
}

/// Records emits and joins. Every emit reports one connection reached.
#[derive(Default)]
pub struct RecordingTransport {
    emitted: Mutex<Vec<Emitted>>,
    joins: Mutex<Vec<(DbId, String)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<Emitted> {
        lock(&self.emitted).clone()
    }

    /// Emitted events with the given name.
    pub fn emitted_named(&self, event: &str) -> Vec<Emitted> {
        lock(&self.emitted)
            .iter()
            .filter(|e| e.event.event == event)
            .cloned()
            .collect()
    }

    pub fn joins(&self) -> Vec<(DbId, String)> {
        lock(&self.joins).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RealtimeTransport for RecordingTransport {
    async fn emit(&self, rooms: &[String], event: &RealtimeEvent) -> Result<usize, DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Realtime("recording transport set to fail".into()));
        }
        lock(&self.emitted).push(Emitted {
            rooms: rooms.to_vec(),
            event: event.clone(),
        });
        Ok(1)
    }

    async fn join_user_to_room(&self, user_id: DbId, room: &str) -> Result<usize, DeliveryError> {
        lock(&self.joins).push((user_id, room.to_string()));
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A [`NotificationCore`] over an [`InMemoryStore`], recording doubles and a
/// manual clock set to Wednesday 2026-03-04 10:00 UTC. Quiet hours are
/// evaluated in UTC so tests do not depend on the host time zone.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
    pub email: Arc<RecordingEmailSender>,
    pub core: Arc<NotificationCore>,
}

impl Harness {
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 4, 10, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let transport = Arc::new(RecordingTransport::new());
        let email = Arc::new(RecordingEmailSender::new());

        let config = DeliveryConfig {
            quiet_hours_clock: QuietHoursClock::Utc,
            ..DeliveryConfig::default()
        };
        let core = Arc::new(NotificationCore::new(
            Stores::from_shared(Arc::clone(&store)),
            transport.clone(),
            Some(email.clone() as Arc<dyn EmailSender>),
            config,
            clock.clone() as Arc<dyn Clock>,
            EmailLinks::default(),
        ));

        Self {
            store,
            clock,
            transport,
            email,
            core,
        }
    }

    /// Register a user with an email address and return their id.
    pub fn add_user(&self, email: &str, first_name: &str) -> DbId {
        let user_id = new_id();
        self.store.add_recipient(Recipient {
            user_id,
            email: email.to_string(),
            first_name: first_name.to_string(),
        });
        user_id
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
