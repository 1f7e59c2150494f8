use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The highest number of stars a category can be given.
pub const MAX_RATING: u8 = 5;

/// A star rating from 0 to `MAX_RATING`, where 0 means the category was left
/// unrated.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Rating must be between 0 and {MAX_RATING}, got {0}.")]
pub struct RatingOutOfRange(pub i64);

impl Rating {
    pub const UNRATED: Rating = Rating(0);

    pub fn new(stars: u8) -> Result<Self, RatingOutOfRange> {
        Self::try_from(i64::from(stars))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_rated(self) -> bool {
        self.0 > 0
    }

    /// Renders the rating as filled and empty stars, e.g. "★★★☆☆".
    pub fn stars(self) -> String {
        let filled = usize::from(self.0);
        let empty = usize::from(MAX_RATING - self.0);
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(stars) if stars <= MAX_RATING => Ok(Rating(stars)),
            _ => Err(RatingOutOfRange(value)),
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, MAX_RATING)
    }
}

/// The in-progress answer for a single category on the form.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct CategoryResponse {
    pub rating: Rating,
    pub comment: String,
}

/// Who is giving the feedback.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitterInfo {
    pub name: String,
    pub designation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_comment: Option<String>,
}

/// The persisted answer for a single category.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaFeedback {
    pub area_id: String,
    pub rating: Rating,
    pub comment: String,
}

/// The body of a feedback document as it is written to the store. The store
/// assigns the id on creation.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDocument {
    pub submitter: SubmitterInfo,
    /// One entry per configured category, in configured order.
    pub feedback: Vec<AreaFeedback>,
    #[serde(with = "iso_millis")]
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackDocument {
    pub fn to_json(&self) -> Result<Value, RecordError> {
        serde_json::to_value(self).map_err(|e| RecordError::Encode(e.to_string()))
    }
}

/// A submission that was read back from the store.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FeedbackRecord {
    pub id: String,
    pub submitter: SubmitterInfo,
    pub feedback: Vec<AreaFeedback>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("Document has no id.")]
    MissingId,
    #[error("Document `{id}` is malformed: {reason}")]
    Malformed { id: String, reason: String },
    #[error("Unable to encode feedback document: {0}")]
    Encode(String),
}

impl FeedbackRecord {
    /// Builds a record from a raw document read from the store. Every field of
    /// `FeedbackDocument` must be present with the right shape; anything else
    /// is rejected rather than surfacing half-filled records.
    pub fn from_document(id: String, data: Value) -> Result<Self, RecordError> {
        if id.is_empty() {
            return Err(RecordError::MissingId);
        }
        let document: FeedbackDocument = match serde_json::from_value(data) {
            Ok(document) => document,
            Err(e) => return Err(RecordError::Malformed { id, reason: e.to_string() }),
        };
        Ok(Self::with_id(id, document))
    }

    pub fn with_id(id: String, document: FeedbackDocument) -> Self {
        let FeedbackDocument { submitter, feedback, submitted_at } = document;
        Self { id, submitter, feedback, submitted_at }
    }

    pub fn area(&self, area_id: &str) -> Option<&AreaFeedback> {
        self.feedback.iter().find(|area| area.area_id == area_id)
    }
}

/// Timestamps are stored as RFC 3339 strings with exactly millisecond
/// precision so that the store's lexicographic order is chronological.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid submittedAt `{raw}`: {e}")))
    }
}
