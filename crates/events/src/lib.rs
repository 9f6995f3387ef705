//! Notification delivery for the course platform.
//!
//! [`NotificationCore`] wires every service over one set of stores, one
//! real-time transport and an optional email sender:
//!
//! - [`dispatcher`]: create notifications and route them to channels.
//! - [`sweeper`]: release notifications held back by quiet hours.
//! - [`digest`]: batch notifications into daily and weekly emails.
//! - [`broadcaster`]: course change events, with debouncing.
//! - [`triggers`]: scheduled reminder and summary jobs.
//! - [`inbox`] and [`preferences`]: the user-facing read and settings side.

pub mod broadcaster;
pub mod config;
pub mod delivery;
pub mod digest;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod inbox;
pub mod preferences;
pub mod sweeper;
pub mod testing;
pub mod triggers;

use std::sync::Arc;

use coursecast_core::clock::Clock;
use coursecast_db::Stores;

pub use broadcaster::CourseEventBroadcaster;
pub use config::DeliveryConfig;
pub use delivery::email::{EmailLinks, EmailSender};
pub use delivery::realtime::{RealtimeEvent, RealtimeTransport};
pub use delivery::BackgroundTasks;
pub use digest::DigestAggregator;
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use error::{NotificationError, NotificationResult};
pub use inbox::Inbox;
pub use preferences::PreferenceService;
pub use sweeper::DeferredSweeper;
pub use triggers::TriggerRunner;

/// Every notification service, built over shared collaborators.
///
/// Long-running loops (`sweeper.run`, `digests.run`, `triggers.run`) are not
/// started here; the binary spawns them under its own cancellation token.
pub struct NotificationCore {
    pub config: DeliveryConfig,
    pub tasks: BackgroundTasks,
    pub preferences: PreferenceService,
    pub inbox: Inbox,
    pub digests: Arc<DigestAggregator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sweeper: Arc<DeferredSweeper>,
    pub broadcaster: Arc<CourseEventBroadcaster>,
    pub triggers: Arc<TriggerRunner>,
}

impl NotificationCore {
    pub fn new(
        stores: Stores,
        transport: Arc<dyn RealtimeTransport>,
        email: Option<Arc<dyn EmailSender>>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
        links: EmailLinks,
    ) -> Self {
        let tasks = BackgroundTasks::new();

        let digests = Arc::new(DigestAggregator::new(
            Arc::clone(&stores.digests),
            email.clone(),
            links.clone(),
            Arc::clone(&clock),
        ));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            stores.clone(),
            Arc::clone(&transport),
            email,
            Arc::clone(&digests),
            tasks.clone(),
            links,
            Arc::clone(&clock),
            config.quiet_hours_clock,
        ));

        let sweeper = Arc::new(DeferredSweeper::new(
            Arc::clone(&stores.deferred),
            Arc::clone(&stores.preferences),
            Arc::clone(&dispatcher),
            Arc::clone(&clock),
            config.quiet_hours_clock,
        ));

        let triggers = Arc::new(TriggerRunner::new(
            Arc::clone(&stores.triggers),
            Arc::clone(&stores.notifications),
            Arc::clone(&stores.deferred),
            Arc::clone(&dispatcher),
            Arc::clone(&clock),
        ));

        let broadcaster = Arc::new(CourseEventBroadcaster::new(transport, Arc::clone(&clock)));

        let preferences = PreferenceService::new(Arc::clone(&stores.preferences), Arc::clone(&clock));
        let inbox = Inbox::new(
            Arc::clone(&stores.notifications),
            Arc::clone(&stores.deferred),
            clock,
        );

        tracing::info!(
            quiet_hours_clock = %config.quiet_hours_clock,
            "Notification core initialised"
        );

        Self {
            config,
            tasks,
            preferences,
            inbox,
            digests,
            dispatcher,
            sweeper,
            broadcaster,
            triggers,
        }
    }
}
