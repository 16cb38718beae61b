//! Approval workflow and version control for stored SQL scripts.
//!
//! [`approval::ApprovalEngine`] gates create/update/delete changes behind a
//! reviewer (administrators self-approve), [`versioning::VersionService`]
//! keeps an immutable semantically-versioned snapshot of every accepted
//! change, and [`history::HistoryRecorder`] logs each request transition.
//! Persistence goes through [`store::DocumentStore`].

pub mod approval;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod history;
pub mod ids;
pub mod models;
pub mod store;
pub mod versioning;
