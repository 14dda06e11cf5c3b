pub mod config;
pub mod error;
pub mod llm;
pub mod mapping;
pub mod pipeline;
pub mod processing;
pub mod types;

// Re-export primary types for convenience
pub use config::FillerConfig;
pub use error::FillError;
pub use pipeline::FormFiller;
pub use types::{
    AnalysisReport, ApplicantData, FieldNameMapping, FieldValueMapping, FillOutcome,
    FlattenedFormData, MappingSource, PdfFormField, WidgetType, WriteStats,
};

// Re-export LLM types
pub use llm::{ApiProvider, ExternalProvider, GenerationConfig, LLMProvider, ProviderInfo};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
