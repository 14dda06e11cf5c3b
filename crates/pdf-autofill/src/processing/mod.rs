pub mod acroform;
pub mod flatten;
pub mod inspector;
pub mod serializer;
pub mod writer;

#[cfg(test)]
pub(crate) mod fixtures;

pub use acroform::AcroForm;
pub use serializer::{encode_for_transport, DocumentSerializer};
pub use writer::FieldWriter;
