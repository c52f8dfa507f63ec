//! HTTP implementations of the transformation and analysis service seams.

pub mod analysis;
pub mod http;
pub mod transformation;

use thiserror::Error;

pub use analysis::HttpAnalysisService;
pub use transformation::HttpTransformationService;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientBuildError {
    #[error("upstream API key contains characters that are not valid in an HTTP header")]
    InvalidApiKey,
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}
