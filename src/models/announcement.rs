use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewAnnouncement {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
}

impl NewAnnouncement {
    pub fn into_announcement(self, posted_by: String, now: DateTime<Utc>) -> Announcement {
        Announcement {
            title: self.title,
            description: self.description,
            posted_by: Some(posted_by),
            created_at: now,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct AnnouncementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 5000))]
    pub description: Option<String>,
}
