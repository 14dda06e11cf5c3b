//! Deterministic overrides applied on top of any mapping.
//!
//! The known template labels its relationship checkboxes `SPOUSE2`,
//! `SPOUSE2_2`, … although they sit on the child rows. Models get this wrong
//! reliably, so those fields are always recomputed from the flattened data.

use crate::config::TemplateRules;
use crate::types::{FieldValueMapping, FlattenedFormData};

/// Clear every relationship field, then give the i-th one the relationship of
/// the i-th non-spouse dependent row. Only fields present in the template are
/// written.
pub fn apply_relationship_corrections(
    mapping: &mut FieldValueMapping,
    raw_names: &[String],
    flat: &FlattenedFormData,
    rules: &TemplateRules,
) {
    mapping.retain(|field, _| !rules.is_relationship_field(field));

    let first_row = if flat.has_spouse() { 2 } else { 1 };
    for (i, configured) in rules.relationship_fields.iter().enumerate() {
        let Some(actual) = raw_names.iter().find(|n| n.eq_ignore_ascii_case(configured)) else {
            continue;
        };
        let key = format!("dependent{}_relationship", first_row + i);
        match flat.get(&key).map(str::trim).filter(|v| !v.is_empty()) {
            Some(relationship) => {
                tracing::debug!(field = %actual, source = %key, "Relationship corrected");
                mapping.insert(actual.clone(), relationship.to_string());
            }
            None => tracing::debug!(field = %actual, "Relationship cleared, no dependent row"),
        }
    }
}
