//! Keyword matcher used when the model is unavailable or its output is unusable.

use std::collections::BTreeMap;

use crate::config::TemplateRules;
use crate::types::{FieldValueMapping, FlattenedFormData};

/// How a flattened key matched a field name. Exact beats containment; among
/// containment matches the longest key wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchStrength {
    Contains(usize),
    Exact,
}

/// Map raw field names to values by name matching against flattened keys.
pub fn fallback_mapping(
    raw_names: &[String],
    flat: &FlattenedFormData,
    rules: &TemplateRules,
) -> FieldValueMapping {
    let mut best: BTreeMap<&str, (MatchStrength, &str)> = BTreeMap::new();

    for (key, value) in flat.iter() {
        if value.trim().is_empty() {
            continue;
        }
        let key_lower = key.to_lowercase();
        for field in raw_names {
            let field_lower = field.to_lowercase();
            let strength = if field_lower == key_lower {
                MatchStrength::Exact
            } else if field_lower.contains(&key_lower) {
                MatchStrength::Contains(key.len())
            } else {
                continue;
            };
            let slot = best.entry(field.as_str()).or_insert((strength, value.as_str()));
            if strength > slot.0 {
                *slot = (strength, value.as_str());
            }
        }
    }

    let mut mapping: FieldValueMapping = best
        .into_iter()
        .map(|(field, (_, value))| (field.to_string(), value.to_string()))
        .collect();

    let answer = if flat.has_spouse() { "YES" } else { "NO" };
    for field in raw_names.iter().filter(|f| rules.is_marriage_field(f)) {
        mapping.insert(field.clone(), answer.to_string());
    }

    tracing::info!(
        matched = mapping.len(),
        fields = raw_names.len(),
        "Fallback mapping built"
    );
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FillerConfig;

    fn flat(pairs: &[(&str, &str)]) -> FlattenedFormData {
        let mut out = FlattenedFormData::new();
        for (k, v) in pairs {
            out.insert(*k, *v);
        }
        out
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_and_contained_keys() {
        let rules = FillerConfig::default().template;
        let data = flat(&[
            ("firstName", "John"),
            ("dependent2_firstName", "Sam"),
            ("city", "Toronto"),
            ("phone", ""),
        ]);
        let mapping = fallback_mapping(
            &names(&["FirstName", "Dependent2_FirstName", "Home City", "Phone", "Unrelated"]),
            &data,
            &rules,
        );

        assert_eq!(mapping["FirstName"], "John");
        assert_eq!(mapping["Dependent2_FirstName"], "Sam");
        assert_eq!(mapping["Home City"], "Toronto");
        assert!(!mapping.contains_key("Phone"));
        assert!(!mapping.contains_key("Unrelated"));
    }

    #[test]
    fn test_marriage_question_uses_spouse_conjunction() {
        let rules = FillerConfig::default().template;
        let field = names(&["Are you married or in a common law relationship?"]);

        let married = flat(&[
            ("maritalStatus", "Common-law"),
            ("spouseFirstName", "Jane"),
            ("spouseLastName", "Doe"),
        ]);
        assert_eq!(fallback_mapping(&field, &married, &rules)[&field[0]], "YES");

        // Spousal status without both names is not a spouse.
        let nameless = flat(&[("maritalStatus", "Married"), ("spouseFirstName", "Jane")]);
        assert_eq!(fallback_mapping(&field, &nameless, &rules)[&field[0]], "NO");
    }
}
