//! Payloads of the course-change events pushed to socket clients.
//!
//! Payloads are deliberately light (course id and field names only); clients
//! re-fetch fresh data from the API when they receive one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// What happened to a course in the public catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogAction {
    Published,
    Unpublished,
    Updated,
    Removed,
    Added,
}

impl CatalogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogAction::Published => "published",
            CatalogAction::Unpublished => "unpublished",
            CatalogAction::Updated => "updated",
            CatalogAction::Removed => "removed",
            CatalogAction::Added => "added",
        }
    }
}

impl fmt::Display for CatalogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(CatalogAction::Published),
            "unpublished" => Ok(CatalogAction::Unpublished),
            "updated" => Ok(CatalogAction::Updated),
            "removed" => Ok(CatalogAction::Removed),
            "added" => Ok(CatalogAction::Added),
            other => Err(CoreError::Validation(format!("Unknown catalog action '{other}'"))),
        }
    }
}

/// `course:updated`: the union of fields changed during one debounce window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseUpdatedPayload {
    pub course_id: DbId,
    pub fields: Vec<String>,
    pub timestamp: Timestamp,
}

/// `course:catalog-changed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseCatalogChangedPayload {
    pub action: CatalogAction,
    pub course_id: DbId,
    pub timestamp: Timestamp,
}

/// `course:enrollment-changed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrollmentChangedPayload {
    pub course_id: DbId,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updated_payload_uses_camel_case() {
        let payload = CourseUpdatedPayload {
            course_id: uuid::Uuid::nil(),
            fields: vec!["title".into()],
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("courseId").is_some());
        assert_eq!(json["fields"][0], "title");
    }

    #[test]
    fn catalog_action_parses_known_values() {
        assert_eq!("removed".parse::<CatalogAction>().unwrap(), CatalogAction::Removed);
        assert!("archived".parse::<CatalogAction>().is_err());
    }
}
