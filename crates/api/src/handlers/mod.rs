pub mod admin;
pub mod course_event;
pub mod notification;
