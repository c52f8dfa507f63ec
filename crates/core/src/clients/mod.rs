pub mod analysis;
pub mod transformation;

pub use analysis::AnalysisClient;
pub use transformation::TransformationClient;
