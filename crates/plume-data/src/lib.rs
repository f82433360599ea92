#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/plume-forecast/plume/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod loader;
pub mod record;

pub use error::{DataError, Result};
pub use record::{Dataset, Record, columns};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
