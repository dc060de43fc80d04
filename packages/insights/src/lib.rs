// ABOUTME: MarketWise insights library - AI-generated diagnosis and marketing artifacts
// ABOUTME: Provides the insight service, profile storage and answer formatting

pub mod error;
pub mod format;
pub mod profile;
pub mod service;
pub mod types;

pub use error::{InsightError, Result};
pub use format::{format_responses, split_posts};
pub use profile::ProfileStorage;
pub use service::InsightService;
pub use types::*;
