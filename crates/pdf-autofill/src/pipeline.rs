//! End-to-end fill and analysis entry points.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::FillerConfig;
use crate::error::FillError;
use crate::llm::{ExternalProvider, LLMProvider};
use crate::mapping::corrections::apply_relationship_corrections;
use crate::mapping::{suggested_data_key, SemanticFieldMapper};
use crate::processing::flatten::flatten;
use crate::processing::inspector::{categorize, describe_fields, summarize};
use crate::processing::{encode_for_transport, AcroForm, DocumentSerializer, FieldWriter};
use crate::types::{
    AnalysisReport, ApplicantData, FieldNameMapping, FieldValueMapping, FillOutcome,
    FlattenedFormData, MappingSource, WriteStats,
};

/// Fills enrolment templates. Holds no per-request state, so one instance
/// can serve concurrent requests.
pub struct FormFiller {
    llm: Option<Arc<dyn LLMProvider>>,
    config: FillerConfig,
    serializer: DocumentSerializer,
}

impl FormFiller {
    pub fn new(config: FillerConfig, llm: Option<Arc<dyn LLMProvider>>) -> Self {
        Self {
            llm,
            config,
            serializer: DocumentSerializer::default(),
        }
    }

    /// Build the configured provider. Missing API keys disable AI mapping
    /// rather than failing; the fallback matcher still fills the form.
    pub fn from_config(config: FillerConfig) -> anyhow::Result<Self> {
        let llm: Option<Arc<dyn LLMProvider>> = if !config.llm.enabled {
            tracing::info!("AI mapping disabled by configuration");
            None
        } else if let Some(key) = config.llm.api_key() {
            let provider =
                ExternalProvider::new(config.llm.provider.clone(), key, config.llm.model.clone())?;
            tracing::info!(provider = ?config.llm.provider, model = %config.llm.model, "AI mapping enabled");
            Some(Arc::new(provider))
        } else {
            tracing::warn!(
                "{} is not set; AI mapping disabled, using fallback matcher",
                config.llm.api_key_env
            );
            None
        };
        Ok(Self::new(config, llm))
    }

    pub fn with_serializer(mut self, serializer: DocumentSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn config(&self) -> &FillerConfig {
        &self.config
    }

    fn mapper(&self) -> SemanticFieldMapper<'_> {
        SemanticFieldMapper::new(self.llm.as_deref(), &self.config)
    }

    /// Fill `template` with `applicant`. A precomputed name mapping skips
    /// the model entirely. Only serialization and encoding failures are errors;
    /// an unreadable or fieldless template comes back unchanged.
    pub async fn fill(
        &self,
        template: &[u8],
        applicant: &ApplicantData,
        precomputed: Option<&FieldNameMapping>,
    ) -> Result<FillOutcome, FillError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("fill", %request_id);
        self.fill_request(request_id, template, applicant, precomputed)
            .instrument(span)
            .await
    }

    async fn fill_request(
        &self,
        request_id: Uuid,
        template: &[u8],
        applicant: &ApplicantData,
        precomputed: Option<&FieldNameMapping>,
    ) -> Result<FillOutcome, FillError> {
        let flat = flatten(applicant);
        tracing::info!(keys = flat.len(), "Applicant data flattened");

        let mut form = match AcroForm::load(template) {
            Ok(form) if !form.is_empty() => form,
            Ok(_) => {
                tracing::info!("Template has no form fields, returning it unchanged");
                return FillOutcome::passthrough(request_id, template);
            }
            Err(e) => {
                tracing::warn!("Template could not be parsed, returning it unchanged: {:#}", e);
                return FillOutcome::passthrough(request_id, template);
            }
        };

        let raw_names = form.field_names();
        tracing::info!(fields = raw_names.len(), "Template fields found");

        let (mapping, source) = match precomputed {
            Some(names) => (
                self.resolve_precomputed(names, &raw_names, &flat),
                MappingSource::Precomputed,
            ),
            None => {
                let result = self.mapper().map_fields(&raw_names, &flat).await;
                (result.mapping, result.source)
            }
        };

        let stats = FieldWriter::new(&self.config.template).write(&mut form, &mapping, &flat);
        let pdf = self.serializer.serialize(form.document())?;
        let encoded = encode_for_transport(&pdf)?;

        tracing::info!(
            bytes = pdf.len(),
            source = ?source,
            written = stats.success_count,
            "Template filled"
        );

        Ok(FillOutcome {
            request_id,
            pdf,
            encoded,
            filled: true,
            fields_found: raw_names.len(),
            mapping_source: source,
            stats,
        })
    }

    /// Values for a reviewed original-name → data-key mapping. Keys resolve
    /// exactly, then ignoring ASCII case.
    fn resolve_precomputed(
        &self,
        names: &FieldNameMapping,
        raw_names: &[String],
        flat: &FlattenedFormData,
    ) -> FieldValueMapping {
        let mut mapping = FieldValueMapping::new();
        for (field, key) in names {
            let value = flat.get(key).or_else(|| {
                flat.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.as_str())
            });
            match value {
                Some(v) if !v.trim().is_empty() => {
                    mapping.insert(field.clone(), v.to_string());
                }
                _ => tracing::debug!(field = %field, key = %key, "No data for precomputed key"),
            }
        }
        apply_relationship_corrections(&mut mapping, raw_names, flat, &self.config.template);
        mapping
    }

    /// Describe a template: fields, clean names, categories, and a suggested
    /// name mapping a reviewer can edit and pass back to [`Self::fill`].
    pub async fn analyze(&self, template: &[u8]) -> AnalysisReport {
        let mut fields = match AcroForm::load(template) {
            Ok(form) => describe_fields(&form),
            Err(e) => {
                tracing::warn!("Template could not be parsed: {:#}", e);
                Vec::new()
            }
        };

        let raw_names: Vec<String> = fields.iter().map(|f| f.original_name.clone()).collect();
        let (clean, from_ai) = if raw_names.is_empty() {
            (Default::default(), false)
        } else {
            self.mapper().clean_names(&raw_names).await
        };

        let mut suggested_mapping = FieldNameMapping::new();
        for field in &mut fields {
            if let Some(name) = clean.get(&field.original_name) {
                field.category = Some(categorize(name, &self.config.categories));
                field.clean_name = Some(name.clone());
                suggested_mapping.insert(field.original_name.clone(), suggested_data_key(name));
            }
        }

        let structure = summarize(&fields);
        tracing::info!(
            fields = structure.total_fields,
            sections = structure.sections.len(),
            clean_names_from_ai = from_ai,
            "Template analyzed"
        );

        AnalysisReport {
            fields,
            structure,
            suggested_mapping,
            clean_names_from_ai: from_ai,
        }
    }
}

impl FillOutcome {
    /// The template's own bytes, unfilled.
    fn passthrough(request_id: Uuid, template: &[u8]) -> Result<Self, FillError> {
        Ok(Self {
            request_id,
            pdf: template.to_vec(),
            encoded: encode_for_transport(template)?,
            filled: false,
            fields_found: 0,
            mapping_source: MappingSource::None,
            stats: WriteStats::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationConfig, ProviderInfo};
    use crate::processing::fixtures::{blank_pdf, FormFixture};
    use crate::processing::serializer::{PlainSave, SaveStrategy};
    use crate::types::FieldCategory;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;

    struct CannedProvider(String);

    #[async_trait]
    impl LLMProvider for CannedProvider {
        async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String> {
            Ok(self.0.clone())
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "canned".into(),
                model: "test".into(),
                context_window: 4096,
                is_local: true,
            }
        }
    }

    struct FailingSave;

    impl SaveStrategy for FailingSave {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn save(&self, _doc: &lopdf::Document) -> Result<Vec<u8>> {
            Err(anyhow!("forced failure"))
        }
    }

    fn applicant() -> ApplicantData {
        ApplicantData::from_value(json!({
            "firstName": "John",
            "lastName": "Smith",
            "city": "Toronto",
            "maritalStatus": "Married",
            "spouseFirstName": "Jane",
            "spouseLastName": "Smith",
            "dependents": [
                {"id": "d2", "firstName": "Ann", "lastName": "Smith", "dateOfBirth": "2015-01-01", "relationship": "Daughter"},
                {"id": "d1", "firstName": "Bob", "lastName": "Smith", "dateOfBirth": "2010-01-01", "relationship": "Son"}
            ]
        }))
        .unwrap()
    }

    fn template() -> Vec<u8> {
        FormFixture::new()
            .text("First Name")
            .text("Last Name")
            .text("City")
            .text("Dependent2 Name")
            .text("SPOUSE2")
            .radio("Are you married", &["Yes", "No"])
            .build()
    }

    fn precomputed() -> FieldNameMapping {
        [
            ("First Name", "firstName"),
            ("Last Name", "LASTNAME"),
            ("City", "city"),
            ("Dependent2 Name", "dependent2_formattedName"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn text_value(pdf: &[u8], name: &str) -> Option<String> {
        let form = AcroForm::load(pdf).unwrap();
        let entry = form.find(name)?;
        let dict = form.document().get_object(entry.id).ok()?.as_dict().ok()?;
        match dict.get(b"V").ok()? {
            lopdf::Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
            lopdf::Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_fieldless_template_passes_through() {
        let filler = FormFiller::new(FillerConfig::default(), None);
        let blank = blank_pdf();

        let outcome = filler.fill(&blank, &applicant(), None).await.unwrap();
        assert!(!outcome.filled);
        assert_eq!(outcome.pdf, blank);
        assert_eq!(outcome.mapping_source, MappingSource::None);

        let garbage = b"not a pdf".to_vec();
        let outcome = filler.fill(&garbage, &applicant(), None).await.unwrap();
        assert!(!outcome.filled);
        assert_eq!(outcome.pdf, garbage);
        assert_eq!(outcome.encoded, "bm90IGEgcGRm");
    }

    #[tokio::test]
    async fn test_precomputed_mapping_is_byte_identical_across_runs() {
        let filler = FormFiller::new(FillerConfig::default(), None);
        let template = template();
        let names = precomputed();

        let first = filler.fill(&template, &applicant(), Some(&names)).await.unwrap();
        let second = filler.fill(&template, &applicant(), Some(&names)).await.unwrap();

        assert!(first.filled);
        assert_eq!(first.mapping_source, MappingSource::Precomputed);
        assert_eq!(first.pdf, second.pdf);
        assert_eq!(first.encoded, second.encoded);
        assert_ne!(first.request_id, second.request_id);

        assert_eq!(text_value(&first.pdf, "Last Name").as_deref(), Some("Smith"));
        assert_eq!(text_value(&first.pdf, "Dependent2 Name").as_deref(), Some("Bob Smith"));
        assert_eq!(text_value(&first.pdf, "SPOUSE2").as_deref(), Some("Son"));
        assert_eq!(text_value(&first.pdf, "Are you married").as_deref(), Some("Yes"));
    }

    #[tokio::test]
    async fn test_ai_mapping_fills_template() {
        let provider = CannedProvider(
            r#"{"First Name": "John", "Last Name": "Smith", "City": "Toronto", "Ghost Field": "x"}"#.into(),
        );
        let filler = FormFiller::new(FillerConfig::default(), Some(Arc::new(provider)));

        let outcome = filler.fill(&template(), &applicant(), None).await.unwrap();
        assert!(outcome.filled);
        assert_eq!(outcome.mapping_source, MappingSource::Ai);
        assert_eq!(outcome.fields_found, 6);
        // Three named fields plus the corrected relationship field.
        assert_eq!(outcome.stats.success_count, 4);
        assert_eq!(outcome.stats.error_count, 1);
        assert_eq!(text_value(&outcome.pdf, "City").as_deref(), Some("Toronto"));
    }

    #[tokio::test]
    async fn test_serialization_failure_is_fatal() {
        let filler = FormFiller::new(FillerConfig::default(), None).with_serializer(
            DocumentSerializer::new(Box::new(FailingSave), Box::new(FailingSave)),
        );
        let result = filler.fill(&template(), &applicant(), Some(&precomputed())).await;
        assert!(matches!(result, Err(FillError::Serialization { .. })));

        let filler = FormFiller::new(FillerConfig::default(), None).with_serializer(
            DocumentSerializer::new(Box::new(FailingSave), Box::new(PlainSave)),
        );
        let outcome = filler.fill(&template(), &applicant(), Some(&precomputed())).await.unwrap();
        assert!(outcome.filled);
    }

    #[tokio::test]
    async fn test_analyze_without_model() {
        let filler = FormFiller::new(FillerConfig::default(), None);
        let report = filler.analyze(&template()).await;

        assert!(!report.clean_names_from_ai);
        assert_eq!(report.structure.total_fields, 6);
        assert_eq!(report.suggested_mapping["First Name"], "firstName");
        let first = &report.fields[0];
        assert_eq!(first.clean_name.as_deref(), Some("firstName"));
        assert_eq!(first.category, Some(FieldCategory::Personal));

        let empty = filler.analyze(&blank_pdf()).await;
        assert_eq!(empty.structure.total_fields, 0);
        assert!(empty.suggested_mapping.is_empty());
    }

    #[tokio::test]
    async fn test_suggested_mapping_feeds_fill() {
        let filler = FormFiller::new(FillerConfig::default(), None);
        let report = filler.analyze(&template()).await;

        assert_eq!(report.suggested_mapping["Dependent2 Name"], "dependent2_name");
        assert_eq!(report.fields[3].clean_name.as_deref(), Some("dependent2Name"));

        let outcome = filler
            .fill(&template(), &applicant(), Some(&report.suggested_mapping))
            .await
            .unwrap();
        assert_eq!(outcome.mapping_source, MappingSource::Precomputed);
        assert_eq!(text_value(&outcome.pdf, "First Name").as_deref(), Some("John"));
        assert_eq!(text_value(&outcome.pdf, "Dependent2 Name").as_deref(), Some("Bob Smith"));
    }
}
