//! Helpers shared by discovery, the import table and the CLI.
//!
//! - **URL validation**: SSRF checks applied before local discovery fetches a URL
//! - **Text processing**: markup/control stripping for remote titles and
//!   width-aware truncation for terminal tables

mod text;
mod url_validator;

pub use text::{display_width, strip_control_chars, strip_tags, truncate_to_width};
pub use url_validator::{validate_url, UrlValidationError};
