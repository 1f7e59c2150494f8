use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};

use crate::backend::{FeedbackStore, FEEDBACK_COLLECTION};
use crate::data::{
    time::timestamp_now, AreaFeedback, CategoryList, CategoryResponse, FeedbackDocument, Rating,
    RatingOutOfRange, SubmitterInfo,
};
use crate::validation::{validate_feedback, validate_submitter_info, ValidationError};

/// Shown to the submitter once their feedback has been stored.
pub const SUBMIT_SUCCESS_MESSAGE: &str = "Thank you for your valuable feedback!";

/// Where the most recent submission attempt got to.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub enum SubmitStatus {
    #[default]
    Idle,
    Validating,
    /// The form was incomplete; nothing was written.
    Rejected(ValidationError),
    Persisting,
    /// The feedback was stored under the given document id.
    Succeeded { id: String },
    /// The store could not be written to; the form still holds the answers.
    Failed,
}

impl SubmitStatus {
    /// The text to show the submitter for this status, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            SubmitStatus::Rejected(e) => Some(e.to_string()),
            SubmitStatus::Succeeded { .. } => Some(SUBMIT_SUCCESS_MESSAGE.to_string()),
            SubmitStatus::Failed => Some(SubmitError::Write.to_string()),
            SubmitStatus::Idle | SubmitStatus::Validating | SubmitStatus::Persisting => None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("There was an error submitting your feedback. Please try again.")]
    Write,
}

/// Error type for edits that do not fit the configured form.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormError {
    #[error("Unknown feedback category `{0}`.")]
    UnknownCategory(String),
    #[error(transparent)]
    Rating(#[from] RatingOutOfRange),
}

/// The state of the feedback form while someone fills it in.
#[derive(Debug)]
pub struct FeedbackForm {
    categories: CategoryList,
    /// Always holds exactly one response per configured category.
    responses: HashMap<String, CategoryResponse>,
    submitter: SubmitterInfo,
    status: SubmitStatus,
}

impl FeedbackForm {
    pub fn new(categories: CategoryList) -> Self {
        let responses = initial_responses(&categories);
        Self {
            categories,
            responses,
            submitter: SubmitterInfo::default(),
            status: SubmitStatus::Idle,
        }
    }

    pub fn categories(&self) -> &CategoryList {
        &self.categories
    }

    pub fn response(&self, category_id: &str) -> Option<&CategoryResponse> {
        self.responses.get(category_id)
    }

    pub fn responses(&self) -> &HashMap<String, CategoryResponse> {
        &self.responses
    }

    pub fn submitter(&self) -> &SubmitterInfo {
        &self.submitter
    }

    pub fn status(&self) -> &SubmitStatus {
        &self.status
    }

    /// Whether a submission is under way. A `submit` future that is dropped
    /// part-way puts the form back to `Idle`, so this never outlives the call.
    pub fn is_submitting(&self) -> bool {
        matches!(self.status, SubmitStatus::Validating | SubmitStatus::Persisting)
    }

    pub fn set_rating(&mut self, category_id: &str, stars: u8) -> Result<(), FormError> {
        let rating = Rating::new(stars)?;
        self.response_mut(category_id)?.rating = rating;
        Ok(())
    }

    pub fn set_comment(
        &mut self,
        category_id: &str,
        comment: impl Into<String>,
    ) -> Result<(), FormError> {
        self.response_mut(category_id)?.comment = comment.into();
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.submitter.name = name.into();
    }

    pub fn set_designation(&mut self, designation: impl Into<String>) {
        self.submitter.designation = designation.into();
    }

    /// Sets the free-form comment. Blank text clears it.
    pub fn set_additional_comment(&mut self, comment: impl Into<String>) {
        let comment = comment.into();
        self.submitter.additional_comment = (!comment.trim().is_empty()).then_some(comment);
    }

    /// Clears every answer back to its initial value. The status of the last
    /// submission is kept so that its outcome can still be shown.
    pub fn reset(&mut self) {
        self.responses = initial_responses(&self.categories);
        self.submitter = SubmitterInfo::default();
    }

    /// Whether nothing has been filled in since the form was created or reset.
    pub fn is_pristine(&self) -> bool {
        self.submitter == SubmitterInfo::default()
            && self.responses.values().all(|response| *response == CategoryResponse::default())
    }

    /// Runs the same checks as `submit`, without changing any state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_submitter_info(&self.submitter)?;
        validate_feedback(&self.responses)
    }

    /// The document that submitting now would write. Responses appear in
    /// configured category order.
    pub fn build_document(&self, submitted_at: DateTime<Utc>) -> FeedbackDocument {
        let feedback = self
            .categories
            .ids()
            .map(|id| {
                let response = self.responses.get(id).cloned().unwrap_or_default();
                AreaFeedback {
                    area_id: id.to_string(),
                    rating: response.rating,
                    comment: response.comment,
                }
            })
            .collect();
        let additional_comment = self
            .submitter
            .additional_comment
            .as_deref()
            .map(str::trim)
            .filter(|comment| !comment.is_empty())
            .map(str::to_string);
        FeedbackDocument {
            submitter: SubmitterInfo {
                name: self.submitter.name.trim().to_string(),
                designation: self.submitter.designation.trim().to_string(),
                additional_comment,
            },
            feedback,
            submitted_at,
        }
    }

    /// Validates the form and, if it is complete, writes it to the store as a
    /// single new document. On success the form is cleared and the new
    /// document's id is returned. Nothing is retried; on failure the answers
    /// stay in place for the submitter to try again.
    pub async fn submit<S: FeedbackStore>(&mut self, store: &S) -> Result<String, SubmitError> {
        self.status = SubmitStatus::Validating;
        if let Err(e) = self.validate() {
            self.status = SubmitStatus::Rejected(e);
            return Err(e.into());
        }

        let document = self.build_document(timestamp_now());
        let in_flight = InFlight::start(&mut self.status);
        let written = match document.to_json() {
            Ok(data) => {
                store.create_document(FEEDBACK_COLLECTION, data).await.map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(id) => {
                info!(id = %id, "Feedback submitted");
                in_flight.finish(SubmitStatus::Succeeded { id: id.clone() });
                self.reset();
                Ok(id)
            }
            Err(cause) => {
                error!(%cause, "Failed to submit feedback");
                in_flight.finish(SubmitStatus::Failed);
                Err(SubmitError::Write)
            }
        }
    }

    fn response_mut(&mut self, category_id: &str) -> Result<&mut CategoryResponse, FormError> {
        self.responses
            .get_mut(category_id)
            .ok_or_else(|| FormError::UnknownCategory(category_id.to_string()))
    }
}

/// Holds the form in `Persisting` for the duration of a write. If the write
/// is abandoned the status drops back to `Idle`.
struct InFlight<'a> {
    status: &'a mut SubmitStatus,
}

impl<'a> InFlight<'a> {
    fn start(status: &'a mut SubmitStatus) -> Self {
        *status = SubmitStatus::Persisting;
        Self { status }
    }

    fn finish(self, outcome: SubmitStatus) {
        *self.status = outcome;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if *self.status == SubmitStatus::Persisting {
            *self.status = SubmitStatus::Idle;
        }
    }
}

fn initial_responses(categories: &CategoryList) -> HashMap<String, CategoryResponse> {
    categories.ids().map(|id| (id.to_string(), CategoryResponse::default())).collect()
}
