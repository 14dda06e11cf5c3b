//! Template inspection: which fields exist, what kind of widget each one is,
//! and (for analysis) which section of the enrolment form it belongs to.

use std::collections::BTreeMap;

use super::acroform::AcroForm;
use crate::config::{contains_any, CategoryTable};
use crate::types::{FieldCategory, PdfFormField, StructureSummary, WidgetType};

/// Field names of a template. Unreadable input or no AcroForm yields an
/// empty list; that is the "nothing to fill" state, not an error.
pub fn field_names(pdf: &[u8]) -> Vec<String> {
    match AcroForm::load(pdf) {
        Ok(form) => form.field_names(),
        Err(e) => {
            tracing::warn!("Template could not be parsed: {:#}", e);
            Vec::new()
        }
    }
}

/// Fields with widget types and selectable options.
pub fn inspect(pdf: &[u8]) -> Vec<PdfFormField> {
    match AcroForm::load(pdf) {
        Ok(form) => describe_fields(&form),
        Err(e) => {
            tracing::warn!("Template could not be parsed: {:#}", e);
            Vec::new()
        }
    }
}

pub fn describe_fields(form: &AcroForm) -> Vec<PdfFormField> {
    form.fields()
        .iter()
        .map(|entry| {
            let options = match entry.widget_type {
                WidgetType::Radio => form.radio_options(&entry.name).unwrap_or_default(),
                WidgetType::Dropdown => form.dropdown_options(&entry.name).unwrap_or_default(),
                _ => Vec::new(),
            };
            PdfFormField {
                original_name: entry.name.clone(),
                widget_type: entry.widget_type,
                options,
                clean_name: None,
                category: None,
            }
        })
        .collect()
}

/// First keyword list containing a substring of `clean_name` wins.
pub fn categorize(clean_name: &str, table: &CategoryTable) -> FieldCategory {
    let ordered = [
        (FieldCategory::Personal, &table.personal),
        (FieldCategory::Employment, &table.employment),
        (FieldCategory::Dependent, &table.dependent),
        (FieldCategory::Beneficiary, &table.beneficiary),
        (FieldCategory::Coverage, &table.coverage),
    ];
    ordered
        .into_iter()
        .find(|(_, keywords)| contains_any(clean_name, keywords))
        .map(|(category, _)| category)
        .unwrap_or(FieldCategory::Other)
}

/// Sections present (in category order) and the clean names grouped under each.
pub fn summarize(fields: &[PdfFormField]) -> StructureSummary {
    let mut groups: BTreeMap<FieldCategory, Vec<String>> = BTreeMap::new();
    for field in fields {
        let category = field.category.unwrap_or(FieldCategory::Other);
        let name = field
            .clean_name
            .clone()
            .unwrap_or_else(|| field.original_name.clone());
        groups.entry(category).or_default().push(name);
    }

    StructureSummary {
        total_fields: fields.len(),
        sections: FieldCategory::ALL
            .into_iter()
            .filter(|c| groups.contains_key(c))
            .collect(),
        groups,
    }
}
