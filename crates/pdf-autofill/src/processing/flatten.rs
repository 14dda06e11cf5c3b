//! Applicant data flattening.
//!
//! Turns the nested enrolment payload into the flat `key -> string` map the
//! mapper and writer work from. Collection items become
//! `{singular}{index}_{property}`; the spouse always takes `dependent1` when
//! present, and dependents are ordered oldest first.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::types::{ApplicantData, FlattenedFormData};

static ISO_DATE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("iso date regex is valid")
});

const DEPENDENTS_KEY: &str = "dependents";

/// Flatten applicant data. Pure and infallible; bad dates only disable reordering.
pub fn flatten(data: &ApplicantData) -> FlattenedFormData {
    let mut out = FlattenedFormData::new();

    for (key, value) in data.fields() {
        match value {
            Value::Array(_) => {}
            Value::Object(inner) => {
                for (prop, v) in inner {
                    out.insert(format!("{}_{}", key, prop), stringify(v));
                }
            }
            scalar => out.insert(key.clone(), stringify(scalar)),
        }
    }

    let first_index = if data.has_spouse() {
        write_spouse_row(&mut out, data);
        2
    } else {
        1
    };

    for (offset, dependent) in sort_by_birth_date(data.dependents()).into_iter().enumerate() {
        let prefix = format!("dependent{}", first_index + offset);
        match dependent {
            Value::Object(item) => {
                write_item(&mut out, &prefix, item, true);
                write_name_keys(&mut out, &prefix, item, true);
            }
            other => out.insert(prefix, stringify(other)),
        }
    }

    for (key, value) in data.fields() {
        let Value::Array(items) = value else { continue };
        if key == DEPENDENTS_KEY {
            continue;
        }
        let singular = singularize(key);
        for (i, item) in items.iter().enumerate() {
            let prefix = format!("{}{}", singular, i + 1);
            match item {
                Value::Object(obj) => {
                    write_item(&mut out, &prefix, obj, false);
                    write_name_keys(&mut out, &prefix, obj, false);
                }
                other => out.insert(prefix, stringify(other)),
            }
        }
    }

    out
}

fn write_spouse_row(out: &mut FlattenedFormData, data: &ApplicantData) {
    let first = data.text("spouseFirstName");
    let last = data.text("spouseLastName");
    let dob = data
        .fields()
        .get("spouseDateOfBirth")
        .map(stringify)
        .unwrap_or_default();

    out.insert("dependent1_firstName", first.as_str());
    out.insert("dependent1_lastName", last.as_str());
    out.insert("dependent1_dateOfBirth", dob);
    out.insert("dependent1_gender", data.text("spouseGender"));
    out.insert("dependent1_relationship", "Spouse");

    let full = format_name(&first, &last);
    out.insert("dependent1_formattedName", full.as_str());
    out.insert("dependent1_name", full.as_str());
    out.insert("dependent1_fullName", full);
}

fn write_item(out: &mut FlattenedFormData, prefix: &str, item: &Map<String, Value>, skip_id: bool) {
    for (prop, value) in item {
        if skip_id && prop == "id" {
            continue;
        }
        out.insert(format!("{}_{}", prefix, prop), stringify(value));
    }
}

/// Derived name keys. Always first name then last name.
fn write_name_keys(
    out: &mut FlattenedFormData,
    prefix: &str,
    item: &Map<String, Value>,
    dependent: bool,
) {
    if !item.contains_key("firstName") && !item.contains_key("lastName") {
        return;
    }
    let first = item.get("firstName").map(stringify).unwrap_or_default();
    let last = item.get("lastName").map(stringify).unwrap_or_default();
    let full = format_name(&first, &last);

    out.insert(format!("{}_formattedName", prefix), full.as_str());
    if dependent {
        out.insert(format!("{}_name", prefix), full.as_str());
        out.insert(format!("{}_fullName", prefix), full);
    }
}

pub fn format_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

/// Stable age sort, oldest first. Entries without a parseable `dateOfBirth`
/// keep their slot; only dated entries are permuted among dated slots.
fn sort_by_birth_date(entries: &[Value]) -> Vec<&Value> {
    let dates: Vec<Option<NaiveDate>> = entries
        .iter()
        .map(|e| e.get("dateOfBirth").and_then(|v| parse_date(&stringify(v))))
        .collect();

    let slots: Vec<usize> = dates
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.map(|_| i))
        .collect();

    let mut dated: Vec<(NaiveDate, usize)> = dates
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.map(|date| (date, i)))
        .collect();
    dated.sort_by_key(|(date, _)| *date);

    let mut ordered: Vec<&Value> = entries.iter().collect();
    for (slot, (_, source)) in slots.into_iter().zip(dated) {
        ordered[slot] = &entries[source];
    }
    ordered
}

/// Parse the date shapes the enrolment forms produce.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            raw.get(..10)
                .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        })
}

/// Render a JSON value as form text. ISO dates become `YYYY/MM/DD`.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if ISO_DATE_RE.is_match(s.trim()) {
                if let Some(date) = parse_date(s) {
                    return date.format("%Y/%m/%d").to_string();
                }
            }
            s.clone()
        }
        other => other.to_string(),
    }
}

/// `beneficiaries` -> `beneficiary`, `dependents` -> `dependent`.
pub fn singularize(key: &str) -> String {
    if let Some(stem) = key.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = key.strip_suffix('s') {
        stem.to_string()
    } else {
        key.to_string()
    }
}
