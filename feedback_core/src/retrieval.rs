use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::backend::{
    BackendError, Direction, FeedbackStore, Session, StoredDocument, FEEDBACK_COLLECTION,
    SUBMITTED_AT_FIELD,
};
use crate::data::{
    time::{format_date, format_date_time, relative_time},
    CategoryList, FeedbackRecord, Rating,
};

const NO_COMMENT: &str = "No comments provided";
pub const LOADING_MESSAGE: &str = "Loading feedback...";
pub const EMPTY_MESSAGE: &str = "No feedback submissions yet.";

/// The store could not be read. The cause is logged; only the fixed message
/// is meant for display.
#[derive(Error, Debug, PartialEq, Clone)]
#[error("Could not load feedback.")]
pub struct FetchError {
    pub cause: BackendError,
}

/// Reads every submission, newest first. Submissions with the same timestamp
/// keep the order the store returned them in. Documents that do not have the
/// shape of a submission are skipped.
pub async fn fetch_feedback<S: FeedbackStore>(
    store: &S,
    session: &Session,
) -> Result<Vec<FeedbackRecord>, FetchError> {
    let documents = store
        .query_ordered(session, FEEDBACK_COLLECTION, SUBMITTED_AT_FIELD, Direction::Descending)
        .await
        .map_err(|cause| {
            error!(%cause, "Failed to fetch feedback");
            FetchError { cause }
        })?;

    let mut records: Vec<FeedbackRecord> = documents
        .into_iter()
        .filter_map(|StoredDocument { id, data }| match FeedbackRecord::from_document(id, data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping malformed feedback document");
                None
            }
        })
        .collect();
    // the store compares the raw strings; sort on the parsed instant
    records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    debug!(count = records.len(), "Fetched feedback");
    Ok(records)
}

/// The fetched submissions and which one, if any, is open in detail.
#[derive(Debug, Default)]
pub struct FeedbackListing {
    records: Vec<FeedbackRecord>,
    selected: Option<String>,
    /// Set by the first successful load, unset again by `clear`.
    loaded: bool,
}

impl FeedbackListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FeedbackRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces the whole list. The open detail view stays open if its record
    /// is still present.
    pub fn replace(&mut self, records: Vec<FeedbackRecord>) {
        self.records = records;
        self.loaded = true;
        if self.selected.as_deref().is_some_and(|id| self.get(id).is_none()) {
            self.selected = None;
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.selected = None;
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// What to show in place of the table, if there are no rows to show.
    pub fn placeholder(&self) -> Option<&'static str> {
        if !self.loaded {
            Some(LOADING_MESSAGE)
        } else if self.records.is_empty() {
            Some(EMPTY_MESSAGE)
        } else {
            None
        }
    }

    pub fn get(&self, id: &str) -> Option<&FeedbackRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Opens the detail view for a record. Returns false if there is no
    /// record with that id.
    pub fn select(&mut self, id: &str) -> bool {
        if self.get(id).is_some() {
            self.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn close_detail(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&FeedbackRecord> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn rows(&self, tz: &Tz) -> Vec<FeedbackRow> {
        self.records.iter().map(|record| FeedbackRow::new(record, tz)).collect()
    }

    /// The detail view of the selected record, with times described relative
    /// to `now`.
    pub fn detail(
        &self,
        categories: &CategoryList,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Option<FeedbackDetail> {
        self.selected().map(|record| FeedbackDetail::new(record, categories, tz, now))
    }
}

/// One line of the submissions table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FeedbackRow {
    pub id: String,
    pub name: String,
    pub designation: String,
    pub submitted: String,
}

impl FeedbackRow {
    pub fn new(record: &FeedbackRecord, tz: &Tz) -> Self {
        Self {
            id: record.id.clone(),
            name: record.submitter.name.clone(),
            designation: record.submitter.designation.clone(),
            submitted: format_date(record.submitted_at, tz),
        }
    }
}

impl fmt::Display for FeedbackRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {} ({})  {}", self.id, self.name, self.designation, self.submitted)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AreaDetail {
    pub title: String,
    pub rating: Rating,
    pub comment: String,
}

/// Everything shown for a single submission.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FeedbackDetail {
    pub id: String,
    pub name: String,
    pub designation: String,
    /// e.g. "3 hours ago"
    pub submitted_relative: String,
    pub submitted_at: String,
    pub areas: Vec<AreaDetail>,
    pub additional_comment: Option<String>,
}

impl FeedbackDetail {
    pub fn new(
        record: &FeedbackRecord,
        categories: &CategoryList,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Self {
        let areas = record
            .feedback
            .iter()
            .map(|area| AreaDetail {
                title: categories
                    .get(&area.area_id)
                    .map(|category| category.title.clone())
                    .unwrap_or_else(|| capitalize(&area.area_id)),
                rating: area.rating,
                comment: if area.comment.trim().is_empty() {
                    NO_COMMENT.to_string()
                } else {
                    area.comment.clone()
                },
            })
            .collect();
        Self {
            id: record.id.clone(),
            name: record.submitter.name.clone(),
            designation: record.submitter.designation.clone(),
            submitted_relative: relative_time(record.submitted_at, now),
            submitted_at: format_date_time(record.submitted_at, tz),
            areas,
            additional_comment: record
                .submitter
                .additional_comment
                .clone()
                .filter(|comment| !comment.trim().is_empty()),
        }
    }
}

impl fmt::Display for FeedbackDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Designation: {}", self.designation)?;
        writeln!(f, "Submitted: {} ({})", self.submitted_relative, self.submitted_at)?;
        for area in &self.areas {
            writeln!(f)?;
            writeln!(f, "{}  {}", area.title, area.rating.stars())?;
            writeln!(f, "{}", area.comment)?;
        }
        if let Some(comment) = &self.additional_comment {
            writeln!(f)?;
            writeln!(f, "Additional comments:")?;
            writeln!(f, "{comment}")?;
        }
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
