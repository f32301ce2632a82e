//! Catalog entries: one playable media item per record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_CATEGORY: &str = "movie";

/// A published catalog entry.
///
/// `media_url` is either the location returned by a completed upload or an
/// external link (YouTube, Vimeo, Drive, direct stream) passed through as-is.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub media_url: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Writable fields of a record, used for both insert and update.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaRecord {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub media_url: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewMediaRecord {
    /// Trim fields and turn blank optional strings into `None`.
    ///
    /// Returns the reason when a required field is empty.
    pub fn normalized(self) -> Result<Self, String> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err("title is required".into());
        }
        let media_url = self.media_url.trim().to_string();
        if media_url.is_empty() {
            return Err("mediaUrl is required".into());
        }
        Ok(Self {
            title,
            description: non_blank(self.description),
            cover_url: non_blank(self.cover_url),
            media_url,
            category: Some(
                non_blank(self.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            ),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Listing filter; results are always newest first.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct MediaFilter {
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_blanks_become_none_and_category_defaults() {
        let rec = NewMediaRecord {
            title: "  Metropolis ".into(),
            description: Some("   ".into()),
            cover_url: Some(String::new()),
            media_url: "https://youtu.be/abc".into(),
            category: None,
        }
        .normalized()
        .unwrap();

        assert_eq!(rec.title, "Metropolis");
        assert_eq!(rec.description, None);
        assert_eq!(rec.cover_url, None);
        assert_eq!(rec.category.as_deref(), Some(DEFAULT_CATEGORY));
    }

    #[test]
    fn normalized_rejects_missing_title_or_url() {
        let no_title = NewMediaRecord {
            title: " ".into(),
            media_url: "x".into(),
            ..Default::default()
        };
        assert!(no_title.normalized().is_err());

        let no_url = NewMediaRecord {
            title: "t".into(),
            ..Default::default()
        };
        assert!(no_url.normalized().is_err());
    }
}
