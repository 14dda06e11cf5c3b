use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::{ApiProvider, GenerationConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillerConfig {
    pub llm: LlmSettings,
    pub template: TemplateRules,
    pub categories: CategoryTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub enabled: bool,
    pub provider: ApiProvider,
    pub model: String,
    /// Environment variable holding the API key; never stored in the file.
    pub api_key_env: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
}

/// Keyword tables describing the quirks of the enrolment template in use.
///
/// Matching is ASCII case-insensitive substring matching on field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRules {
    /// Checkbox family that actually holds dependent relationships, in row order.
    pub relationship_fields: Vec<String>,
    /// Radio groups answering "are you married".
    pub marriage_markers: Vec<String>,
    /// Spouse / first dependent row fields, left blank for unmarried applicants.
    pub spouse_row_markers: Vec<String>,
    /// Fields holding a combined dependent or spouse name.
    pub person_markers: Vec<String>,
    pub name_markers: Vec<String>,
}

/// Ordered keyword lists for field categorisation; first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTable {
    pub personal: Vec<String>,
    pub employment: Vec<String>,
    pub dependent: Vec<String>,
    pub beneficiary: Vec<String>,
    pub coverage: Vec<String>,
}

impl FillerConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.enabled && self.llm.model.trim().is_empty() {
            return Err("llm.model must be set when llm.enabled is true".into());
        }
        if self.llm.max_tokens == 0 {
            return Err("llm.max_tokens must be > 0".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err("llm.temperature must be in [0.0, 2.0]".into());
        }
        if !(0.0..=1.0).contains(&self.llm.top_p) {
            return Err("llm.top_p must be in [0.0, 1.0]".into());
        }
        if self.template.relationship_fields.iter().any(|f| f.trim().is_empty()) {
            return Err("template.relationship_fields must not contain blank names".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/pdf-autofill/config.json` when it exists.
    pub fn default_path() -> Option<PathBuf> {
        let path = dirs::config_dir()?.join("pdf-autofill").join("config.json");
        path.exists().then_some(path)
    }

    /// Load from `path`, else the default location, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => Self::from_file(&p),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("PDF_AUTOFILL_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
    }
}

impl LlmSettings {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }
}

impl TemplateRules {
    pub fn is_relationship_field(&self, field: &str) -> bool {
        self.relationship_fields
            .iter()
            .any(|f| f.eq_ignore_ascii_case(field))
    }

    pub fn is_marriage_field(&self, field: &str) -> bool {
        contains_any(field, &self.marriage_markers)
    }

    pub fn is_spouse_row_field(&self, field: &str) -> bool {
        !self.is_relationship_field(field) && contains_any(field, &self.spouse_row_markers)
    }

    pub fn is_person_name_field(&self, field: &str) -> bool {
        contains_any(field, &self.person_markers) && contains_any(field, &self.name_markers)
    }
}

/// ASCII case-insensitive substring test against a keyword list.
pub fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(&n.to_ascii_lowercase()))
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings {
                enabled: true,
                provider: ApiProvider::Google,
                model: "gemini-1.5-flash".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                max_tokens: 8192,
                temperature: 0.1,
                top_p: 0.95,
                top_k: 40,
            },
            template: TemplateRules {
                relationship_fields: words(&["SPOUSE2", "SPOUSE2_2", "SPOUSE2_3", "SPOUSE2_4"]),
                marriage_markers: words(&[
                    "are you married",
                    "common law relationship",
                    "marital status",
                ]),
                spouse_row_markers: words(&["spouse", "dependent1_", "dependent 1", "dep1"]),
                person_markers: words(&["dependent", "spouse", "child", "beneficiary"]),
                name_markers: words(&["name"]),
            },
            categories: CategoryTable {
                personal: words(&[
                    "first", "last", "name", "birth", "dob", "address", "city", "province",
                    "postal", "phone", "email", "gender", "sex", "marital", "sin",
                ]),
                employment: words(&[
                    "employ", "occupation", "job", "salary", "income", "hire", "position",
                    "department", "hours",
                ]),
                dependent: words(&["dependent", "child", "spouse"]),
                beneficiary: words(&["beneficiar", "trustee", "percentage", "share"]),
                coverage: words(&[
                    "coverage", "plan", "benefit", "health", "dental", "life", "insurance",
                    "waive", "premium",
                ]),
            },
        }
    }
}
