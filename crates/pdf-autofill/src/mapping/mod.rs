//! Field mapping: which applicant value goes into which template field.

pub mod corrections;
pub mod fallback;
pub mod json_recovery;
pub mod mapper;

pub use mapper::{heuristic_clean_name, suggested_data_key, MappingResult, SemanticFieldMapper};
