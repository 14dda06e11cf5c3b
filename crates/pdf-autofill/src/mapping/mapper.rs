//! AI-assisted field mapping with a deterministic fallback.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{anyhow, Result};

use super::corrections::apply_relationship_corrections;
use super::fallback::fallback_mapping;
use super::json_recovery::{parse_json_object, to_string_map};
use crate::config::FillerConfig;
use crate::llm::LLMProvider;
use crate::types::{FieldValueMapping, FlattenedFormData, MappingSource};

const BUSINESS_RULES: &str = "\
BUSINESS RULES:
1. If the applicant has a spouse, the spouse is dependent row 1 (dependent1_*). Children follow from dependent2_*.
2. Dependents are listed oldest first.
3. Every person name is written first name then last name (\"Jane Doe\"), even when the field label says \"Last Name First Name\".
4. Relationship checkboxes on the dependent rows are filled by the system; leave them out.
5. The \"Are you married\" question is answered YES or NO from maritalStatus (Married or Common-law means YES).
6. Leave out fields you have no value for.";

static INDEXED_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([a-z]+)(\d+)([A-Z][A-Za-z0-9]*)$").expect("indexed name regex is valid")
});

#[derive(Debug, Clone)]
pub struct MappingResult {
    pub mapping: FieldValueMapping,
    pub source: MappingSource,
}

/// Maps template field names to applicant values.
pub struct SemanticFieldMapper<'a> {
    llm: Option<&'a dyn LLMProvider>,
    config: &'a FillerConfig,
}

impl<'a> SemanticFieldMapper<'a> {
    pub fn new(llm: Option<&'a dyn LLMProvider>, config: &'a FillerConfig) -> Self {
        Self { llm, config }
    }

    /// One model call; any failure on the way degrades to the keyword
    /// fallback. Relationship corrections are applied either way.
    pub async fn map_fields(&self, raw_names: &[String], flat: &FlattenedFormData) -> MappingResult {
        let (mut mapping, source) = match self.ai_mapping(raw_names, flat).await {
            Ok(mapping) => {
                tracing::info!(mapped = mapping.len(), "AI mapping accepted");
                (mapping, MappingSource::Ai)
            }
            Err(e) => {
                tracing::warn!("AI mapping unavailable, using fallback matcher: {:#}", e);
                (
                    fallback_mapping(raw_names, flat, &self.config.template),
                    MappingSource::Fallback,
                )
            }
        };

        apply_relationship_corrections(&mut mapping, raw_names, flat, &self.config.template);
        MappingResult { mapping, source }
    }

    async fn ai_mapping(&self, raw_names: &[String], flat: &FlattenedFormData) -> Result<FieldValueMapping> {
        let llm = self.llm.ok_or_else(|| anyhow!("no LLM provider configured"))?;
        let prompt = build_mapping_prompt(raw_names, flat);

        let output = llm
            .generate(&prompt, &self.config.llm.generation_config())
            .await?;
        let mapping = to_string_map(parse_json_object(&output)?);
        if mapping.is_empty() {
            return Err(anyhow!("model returned an empty mapping"));
        }
        Ok(mapping)
    }

    /// Original name → clean camelCase name. Returns whether the model
    /// supplied the names; missing entries always get the local normalization.
    pub async fn clean_names(&self, raw_names: &[String]) -> (BTreeMap<String, String>, bool) {
        let ai_names = match self.ai_clean_names(raw_names).await {
            Ok(names) => Some(names),
            Err(e) => {
                tracing::warn!("AI clean names unavailable, normalizing locally: {:#}", e);
                None
            }
        };

        let names = raw_names
            .iter()
            .map(|raw| {
                let clean = ai_names
                    .as_ref()
                    .and_then(|m| m.get(raw))
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| heuristic_clean_name(raw));
                (raw.clone(), clean)
            })
            .collect();
        (names, ai_names.is_some())
    }

    async fn ai_clean_names(&self, raw_names: &[String]) -> Result<BTreeMap<String, String>> {
        let llm = self.llm.ok_or_else(|| anyhow!("no LLM provider configured"))?;
        let prompt = format!(
            "These are the interactive field names of a PDF benefits enrolment form:\n{}\n\n\
             For each one give a short, descriptive camelCase name (for example \
             \"Employee First Name\" -> \"employeeFirstName\").\n\
             Return ONLY a JSON object mapping each original name to its clean name. \
             No prose, no markdown fences.",
            field_list(raw_names)
        );
        let output = llm
            .generate(&prompt, &self.config.llm.generation_config())
            .await?;
        Ok(to_string_map(parse_json_object(&output)?))
    }
}

fn field_list(raw_names: &[String]) -> String {
    raw_names
        .iter()
        .map(|n| format!("- {}", n))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_mapping_prompt(raw_names: &[String], flat: &FlattenedFormData) -> String {
    format!(
        "You are filling a PDF benefits enrolment form.\n\n\
         FORM FIELD NAMES (use them exactly as written):\n{}\n\n\
         APPLICANT DATA:\n{}\n\n\
         {}\n\n\
         Return ONLY a JSON object whose keys are form field names from the list above \
         and whose values are the strings to write. No prose, no markdown fences.",
        field_list(raw_names),
        flat.to_prompt_lines(),
        BUSINESS_RULES
    )
}

/// Local camelCase normalization: `"Employee First Name"` → `employeeFirstName`,
/// `"employer.name"` → `employerName`.
pub fn heuristic_clean_name(raw: &str) -> String {
    let mut out = String::new();
    for word in raw.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let all_caps = !word.chars().any(|c| c.is_lowercase());
        let mut chars = word.chars();
        let Some(head) = chars.next() else { continue };
        let tail: String = if all_caps {
            chars.as_str().to_lowercase()
        } else {
            chars.as_str().to_string()
        };
        if out.is_empty() {
            out.extend(head.to_lowercase());
        } else {
            out.extend(head.to_uppercase());
        }
        out.push_str(&tail);
    }

    if out.is_empty() {
        "field".to_string()
    } else if out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("field{}", out)
    } else {
        out
    }
}

/// Flattened data key a clean name most likely refers to: indexed rows
/// (`dependent1FirstName`) become `dependent1_firstName`, anything else is
/// taken as a top-level key unchanged.
pub fn suggested_data_key(clean_name: &str) -> String {
    let Some(caps) = INDEXED_NAME_RE.captures(clean_name) else {
        return clean_name.to_string();
    };
    let property = &caps[3];
    let mut chars = property.chars();
    let head: String = chars.next().map(|c| c.to_lowercase().collect()).unwrap_or_default();
    format!("{}{}_{}{}", &caps[1], &caps[2], head, chars.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationConfig, ProviderInfo};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedProvider {
        output: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedProvider {
        fn new(output: &str) -> Self {
            Self {
                output: output.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for CannedProvider {
        async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.output.clone())
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

    struct FailingProvider;

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String> {
            Err(anyhow!("connection refused"))
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "failing".into(),
                model: "test".into(),
                context_window: 4096,
                is_local: true,
            }
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_flat() -> FlattenedFormData {
        let mut flat = FlattenedFormData::new();
        flat.insert("firstName", "John");
        flat.insert("maritalStatus", "Single");
        flat.insert("dependent1_relationship", "Son");
        flat
    }

    #[tokio::test]
    async fn test_ai_mapping_with_corrections() {
        let config = FillerConfig::default();
        let provider = CannedProvider::new(
            "```json\n{\"First Name\": \"John\", \"SPOUSE2\": \"Spouse\", \"Phone\": null}\n```",
        );
        let mapper = SemanticFieldMapper::new(Some(&provider), &config);

        let result = mapper
            .map_fields(&names(&["First Name", "SPOUSE2", "Phone"]), &sample_flat())
            .await;

        assert_eq!(result.source, MappingSource::Ai);
        assert_eq!(result.mapping["First Name"], "John");
        assert_eq!(result.mapping["SPOUSE2"], "Son");
        assert!(!result.mapping.contains_key("Phone"));
    }

    #[tokio::test]
    async fn test_prompt_carries_fields_data_and_rules() {
        let config = FillerConfig::default();
        let provider = CannedProvider::new("{\"First Name\": \"John\"}");
        let mapper = SemanticFieldMapper::new(Some(&provider), &config);
        mapper.map_fields(&names(&["First Name"]), &sample_flat()).await;

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- First Name"));
        assert!(prompts[0].contains("firstName: John"));
        assert!(prompts[0].contains("oldest first"));
        assert!(prompts[0].contains("Return ONLY a JSON object"));
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back() {
        let config = FillerConfig::default();
        let provider = CannedProvider::new("Sorry, I can't do that.");
        let mapper = SemanticFieldMapper::new(Some(&provider), &config);

        let result = mapper.map_fields(&names(&["FirstName"]), &sample_flat()).await;
        assert_eq!(result.source, MappingSource::Fallback);
        assert_eq!(result.mapping["FirstName"], "John");
    }

    #[tokio::test]
    async fn test_provider_error_and_no_provider_fall_back() {
        let config = FillerConfig::default();
        let fields = names(&["FirstName", "SPOUSE2"]);

        let failing = FailingProvider;
        let result = SemanticFieldMapper::new(Some(&failing), &config)
            .map_fields(&fields, &sample_flat())
            .await;
        assert_eq!(result.source, MappingSource::Fallback);
        assert_eq!(result.mapping["SPOUSE2"], "Son");

        let result = SemanticFieldMapper::new(None, &config)
            .map_fields(&fields, &sample_flat())
            .await;
        assert_eq!(result.source, MappingSource::Fallback);
        assert_eq!(result.mapping["FirstName"], "John");
    }

    #[tokio::test]
    async fn test_clean_names_fill_gaps_locally() {
        let config = FillerConfig::default();
        let provider = CannedProvider::new("{\"EMP_FNAME\": \"employeeFirstName\"}");
        let mapper = SemanticFieldMapper::new(Some(&provider), &config);

        let (names, from_ai) = mapper
            .clean_names(&names(&["EMP_FNAME", "Date of Birth"]))
            .await;
        assert!(from_ai);
        assert_eq!(names["EMP_FNAME"], "employeeFirstName");
        assert_eq!(names["Date of Birth"], "dateOfBirth");

        let (_, from_ai) = SemanticFieldMapper::new(None, &config)
            .clean_names(&["x".to_string()])
            .await;
        assert!(!from_ai);
    }

    #[test]
    fn test_suggested_data_key_splits_indexed_rows() {
        assert_eq!(suggested_data_key("dependent1FirstName"), "dependent1_firstName");
        assert_eq!(suggested_data_key("beneficiary2Percentage"), "beneficiary2_percentage");
        assert_eq!(suggested_data_key("firstName"), "firstName");
        assert_eq!(suggested_data_key("spouse22"), "spouse22");
    }

    #[test]
    fn test_heuristic_clean_name() {
        assert_eq!(heuristic_clean_name("Employee First Name"), "employeeFirstName");
        assert_eq!(heuristic_clean_name("employer.name"), "employerName");
        assert_eq!(heuristic_clean_name("SPOUSE2_2"), "spouse22");
        assert_eq!(heuristic_clean_name("firstName"), "firstName");
        assert_eq!(heuristic_clean_name("1 Address"), "field1Address");
        assert_eq!(heuristic_clean_name("???"), "field");
    }
}
