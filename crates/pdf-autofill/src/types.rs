use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Marital statuses that imply a spouse for business-rule purposes.
pub const SPOUSAL_STATUSES: [&str; 2] = ["Married", "Common-law"];

/// Applicant data as submitted by the enrolment forms.
///
/// Kept as a loose JSON object: scalar fields, a `dependents` array, a
/// `beneficiaries` array and optional spouse fields. Absent keys read as
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantData(pub Map<String, Value>);

impl ApplicantData {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Scalar field rendered as a trimmed string, empty when absent.
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn dependents(&self) -> &[Value] {
        self.0
            .get("dependents")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn beneficiaries(&self) -> &[Value] {
        self.0
            .get("beneficiaries")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Married or common-law, regardless of whether spouse names were given.
    pub fn is_married(&self) -> bool {
        is_spousal_status(&self.text("maritalStatus"))
    }

    /// A spouse counts only when the status is spousal and both names are filled.
    pub fn has_spouse(&self) -> bool {
        self.is_married()
            && !self.text("spouseFirstName").is_empty()
            && !self.text("spouseLastName").is_empty()
    }
}

pub fn is_spousal_status(status: &str) -> bool {
    SPOUSAL_STATUSES.contains(&status.trim())
}

/// Flat string map produced by the flattener. Ordered so prompts and
/// fallback matching are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlattenedFormData(pub BTreeMap<String, String>);

impl FlattenedFormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for `key`, empty when missing.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_married(&self) -> bool {
        is_spousal_status(self.value("maritalStatus"))
    }

    /// Same conjunction as [`ApplicantData::has_spouse`], re-derived from the
    /// verbatim scalar keys.
    pub fn has_spouse(&self) -> bool {
        self.is_married()
            && !self.value("spouseFirstName").trim().is_empty()
            && !self.value("spouseLastName").trim().is_empty()
    }

    /// `key: value` lines, the format embedded in mapping prompts.
    pub fn to_prompt_lines(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Interactive control kind a form field behaves as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Text,
    Checkbox,
    Radio,
    Dropdown,
    Unknown,
}

impl WidgetType {
    /// Order in which the writer tries widget kinds for an unresolved field.
    pub const PRIORITY: [WidgetType; 4] = [
        WidgetType::Text,
        WidgetType::Radio,
        WidgetType::Checkbox,
        WidgetType::Dropdown,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Personal,
    Employment,
    Dependent,
    Beneficiary,
    Coverage,
    Other,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 6] = [
        FieldCategory::Personal,
        FieldCategory::Employment,
        FieldCategory::Dependent,
        FieldCategory::Beneficiary,
        FieldCategory::Coverage,
        FieldCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCategory::Personal => "personal",
            FieldCategory::Employment => "employment",
            FieldCategory::Dependent => "dependent",
            FieldCategory::Beneficiary => "beneficiary",
            FieldCategory::Coverage => "coverage",
            FieldCategory::Other => "other",
        }
    }
}

/// One interactive field discovered in a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfFormField {
    pub original_name: String,
    pub widget_type: WidgetType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FieldCategory>,
}

/// Original field name → value to write.
pub type FieldValueMapping = BTreeMap<String, String>;

/// Original field name → flattened data key, e.g. from a reviewed analysis.
pub type FieldNameMapping = BTreeMap<String, String>;

/// Where the mapping used for a fill came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Ai,
    Fallback,
    Precomputed,
    None,
}

/// Informational counters from the field writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    pub success_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    pub marriage_failures: usize,
}

/// Result of one fill request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillOutcome {
    pub request_id: uuid::Uuid,
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// Base64 of `pdf`, ready for JSON transport.
    pub encoded: String,
    pub filled: bool,
    pub fields_found: usize,
    pub mapping_source: MappingSource,
    pub stats: WriteStats,
}

/// Sections found in a template and the clean field names in each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub total_fields: usize,
    pub sections: Vec<FieldCategory>,
    pub groups: BTreeMap<FieldCategory, Vec<String>>,
}

/// Output of the standalone analysis entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub fields: Vec<PdfFormField>,
    pub structure: StructureSummary,
    /// Original name → flattened data key guessed from the clean name
    /// (`dependent1FirstName` → `dependent1_firstName`), editable by a
    /// reviewer and reusable as a precomputed mapping.
    pub suggested_mapping: FieldNameMapping,
    pub clean_names_from_ai: bool,
}
