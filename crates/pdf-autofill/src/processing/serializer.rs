//! Turns a filled document back into bytes and base64 for transport.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lopdf::Document;

use super::acroform::set_need_appearances;
use crate::error::FillError;

/// Raw bytes per base64 chunk; a multiple of 3 so chunks concatenate cleanly.
const ENCODE_CHUNK: usize = 3 * 16 * 1024;

pub trait SaveStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn save(&self, doc: &Document) -> Result<Vec<u8>>;
}

/// Flags the form for viewer-side appearance regeneration and writes
/// uncompressed streams with a classic cross-reference table.
pub struct FormCompatibleSave;

impl SaveStrategy for FormCompatibleSave {
    fn name(&self) -> &'static str {
        "form-compatible"
    }

    fn save(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut doc = doc.clone();
        set_need_appearances(&mut doc, true)?;
        doc.decompress();
        write_document(&mut doc)
    }
}

/// The document as-is.
pub struct PlainSave;

impl SaveStrategy for PlainSave {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn save(&self, doc: &Document) -> Result<Vec<u8>> {
        write_document(&mut doc.clone())
    }
}

fn write_document(doc: &mut Document) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf)?;
    if buf.is_empty() {
        return Err(anyhow!("save produced no bytes"));
    }
    Ok(buf)
}

pub struct DocumentSerializer {
    primary: Box<dyn SaveStrategy>,
    fallback: Box<dyn SaveStrategy>,
}

impl Default for DocumentSerializer {
    fn default() -> Self {
        Self::new(Box::new(FormCompatibleSave), Box::new(PlainSave))
    }
}

impl DocumentSerializer {
    pub fn new(primary: Box<dyn SaveStrategy>, fallback: Box<dyn SaveStrategy>) -> Self {
        Self { primary, fallback }
    }

    pub fn serialize(&self, doc: &Document) -> Result<Vec<u8>, FillError> {
        let primary_err = match self.primary.save(doc) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        tracing::warn!(
            strategy = self.primary.name(),
            "Save failed, retrying with {}: {:#}",
            self.fallback.name(),
            primary_err
        );

        self.fallback.save(doc).map_err(|fallback_err| FillError::Serialization {
            primary: format!("{:#}", primary_err),
            fallback: format!("{:#}", fallback_err),
        })
    }
}

/// Standard base64, encoded chunk by chunk.
pub fn encode_for_transport(bytes: &[u8]) -> Result<String, FillError> {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    let mut buf = vec![0u8; ENCODE_CHUNK.div_ceil(3) * 4];

    for chunk in bytes.chunks(ENCODE_CHUNK) {
        match STANDARD.encode_slice(chunk, &mut buf) {
            Ok(written) => {
                let text = std::str::from_utf8(&buf[..written])
                    .map_err(|e| FillError::Encoding(e.to_string()))?;
                out.push_str(text);
            }
            Err(e) => {
                tracing::warn!("Chunk encode failed, encoding byte groups individually: {}", e);
                for group in chunk.chunks(3) {
                    STANDARD.encode_string(group, &mut out);
                }
            }
        }
    }
    Ok(out)
}
