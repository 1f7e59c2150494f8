//! Core of a feedback collection app: a public form that anyone can submit
//! ratings and comments through, and an admin dashboard that lists the
//! submissions after signing in. Storage and accounts live in a hosted
//! backend, reached through the traits in [`backend`].

pub mod auth;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod retrieval;
pub mod submission;
pub mod validation;
