//! Zero-sized repositories, one per table, taking the pool explicitly.

pub mod deferred_notification_repo;
pub mod digest_repo;
pub mod notification_preference_repo;
pub mod notification_repo;
pub mod recipient_repo;
pub mod trigger_repo;

pub use deferred_notification_repo::DeferredNotificationRepo;
pub use digest_repo::DigestRepo;
pub use notification_preference_repo::NotificationPreferenceRepo;
pub use notification_repo::NotificationRepo;
pub use recipient_repo::RecipientRepo;
pub use trigger_repo::TriggerRepo;
