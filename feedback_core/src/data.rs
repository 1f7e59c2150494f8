//! The feedback data model: the configured categories, the in-progress form
//! answers, and the documents that are persisted to and read from the store.

pub mod category;
pub mod record;
pub mod time;

pub use category::{CategoryError, CategoryList, FeedbackCategory};
pub use record::{
    AreaFeedback, CategoryResponse, FeedbackDocument, FeedbackRecord, Rating, RatingOutOfRange,
    RecordError, SubmitterInfo, MAX_RATING,
};
