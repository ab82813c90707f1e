//! Tracks keyword batches submitted to the Rank Tracker backend until their
//! ranking data has been fetched, and tells interested views to refresh.
pub mod api;
pub mod error;
pub mod notifier;
pub mod persistence;
pub mod poller;
pub mod settings;
pub mod store;
pub mod types;
