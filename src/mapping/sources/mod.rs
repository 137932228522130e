//! Built-in source mappers and their staging payloads.

pub mod airtable;
pub mod browser_history;
pub mod github;
pub mod lightroom;
pub mod readwise;
pub mod twitter;
