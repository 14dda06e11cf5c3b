use thiserror::Error;

/// Failures that abort a fill request. Everything else degrades to a
/// passthrough or fallback and is only logged.
#[derive(Debug, Error)]
pub enum FillError {
    #[error("could not serialize filled PDF: primary save failed ({primary}); fallback save failed ({fallback})")]
    Serialization { primary: String, fallback: String },

    #[error("could not encode PDF for transport: {0}")]
    Encoding(String),
}
