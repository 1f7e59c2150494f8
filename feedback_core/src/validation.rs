use std::collections::HashMap;

use thiserror::Error;

use crate::data::{CategoryResponse, SubmitterInfo};

/// A reason the form cannot be submitted yet. The message is shown to the
/// submitter as-is.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ValidationError {
    #[error("Please provide your name.")]
    MissingName,
    #[error("Please provide your designation/role.")]
    MissingDesignation,
    #[error("Please provide at least one rating before submitting.")]
    NoRating,
}

/// Checks that the submitter filled in both their name and their designation.
pub fn validate_submitter_info(info: &SubmitterInfo) -> Result<(), ValidationError> {
    if info.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if info.designation.trim().is_empty() {
        return Err(ValidationError::MissingDesignation);
    }
    Ok(())
}

/// Checks that at least one category was given a rating. Comments are optional.
pub fn validate_feedback(
    responses: &HashMap<String, CategoryResponse>,
) -> Result<(), ValidationError> {
    if responses.values().any(|response| response.rating.is_rated()) {
        Ok(())
    } else {
        Err(ValidationError::NoRating)
    }
}
