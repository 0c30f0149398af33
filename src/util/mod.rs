//! Utility functions and small generic containers.
//!
//! This module provides reusable utilities for:
//!
//! - **Paging**: [`Pager`] streams rows out of a paginated source lazily
//! - **Batching**: [`Batcher`] and [`DualBatcher`] group items in front of an async sink
//! - **URL validation**: guards the base URLs that bearer tokens are sent to
//! - **Text formatting**: runtimes, mentions and length limits for chat messages
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use episodic::util::{human_duration, mentions_within, validate_api_base};
//!
//! assert_eq!(human_duration(Duration::from_secs(3900)), "1h5m");
//! assert_eq!(mentions_within(&[7, 8], 2000).0, "<@7> <@8>");
//! assert!(validate_api_base("https://api.themoviedb.org/3").is_ok());
//! ```

mod batch;
mod pager;
mod text;
mod url_validator;

pub use batch::{Batcher, DualBatcher};
pub use pager::Pager;
pub use text::{human_duration, mentions_within, truncate_chars};
pub use url_validator::{validate_api_base, UrlValidationError};
