//! Writes a field-value mapping into an [`AcroForm`].
//!
//! Per-field failures are counted, never propagated.

use anyhow::{anyhow, Result};
use std::collections::HashSet;

use super::acroform::AcroForm;
use super::flatten::format_name;
use crate::config::TemplateRules;
use crate::types::{FieldValueMapping, FlattenedFormData, WidgetType, WriteStats};

const TRUTHY: [&str; 7] = ["yes", "true", "on", "1", "t", "y", "checked"];
const AFFIRMATIVE: [&str; 6] = ["yes", "true", "on", "1", "t", "y"];
const NEGATIVE: [&str; 6] = ["no", "false", "off", "0", "f", "n"];

pub struct FieldWriter<'a> {
    rules: &'a TemplateRules,
}

impl<'a> FieldWriter<'a> {
    pub fn new(rules: &'a TemplateRules) -> Self {
        Self { rules }
    }

    pub fn write(
        &self,
        form: &mut AcroForm,
        mapping: &FieldValueMapping,
        flat: &FlattenedFormData,
    ) -> WriteStats {
        let mut stats = WriteStats::default();
        let married = flat.is_married();

        let handled = self.marriage_pass(form, married, &mut stats);
        let people = known_people(flat);

        for (field, value) in mapping {
            if value.trim().is_empty() {
                continue;
            }
            if handled.iter().any(|h| h.eq_ignore_ascii_case(field)) {
                continue;
            }
            if !married && self.rules.is_spouse_row_field(field) {
                tracing::debug!(field = %field, "Skipping spouse row field for unmarried applicant");
                stats.skipped_count += 1;
                continue;
            }

            let value = if self.rules.is_person_name_field(field) {
                correct_name_order(value, &people)
            } else {
                value.clone()
            };

            match write_field(form, field, &value) {
                Ok(kind) => {
                    tracing::debug!(field = %field, kind = ?kind, "Field written");
                    stats.success_count += 1;
                }
                Err(e) => {
                    tracing::debug!(field = %field, "Field not written: {:#}", e);
                    stats.error_count += 1;
                }
            }
        }

        tracing::info!(
            success = stats.success_count,
            errors = stats.error_count,
            skipped = stats.skipped_count,
            marriage_failures = stats.marriage_failures,
            "Field write pass complete"
        );
        stats
    }

    /// Answers every "are you married" radio group in the template from the
    /// marital status. Returns the names it answered.
    fn marriage_pass(&self, form: &mut AcroForm, married: bool, stats: &mut WriteStats) -> Vec<String> {
        let candidates: Vec<String> = form
            .fields()
            .iter()
            .filter(|f| f.widget_type == WidgetType::Radio && self.rules.is_marriage_field(&f.name))
            .map(|f| f.name.clone())
            .collect();

        let mut handled = Vec::new();
        for name in candidates {
            match answer_marriage_question(form, &name, married) {
                Ok(label) => {
                    tracing::debug!(field = %name, answer = %label, "Marriage question answered");
                    handled.push(name);
                }
                Err(e) => {
                    tracing::debug!(field = %name, "Marriage question not answered: {:#}", e);
                    stats.marriage_failures += 1;
                }
            }
        }
        handled
    }
}

fn answer_marriage_question(form: &mut AcroForm, name: &str, married: bool) -> Result<String> {
    let options = form.radio_options(name)?;
    let wanted = if married { "yes" } else { "no" };
    let label = options
        .iter()
        .find(|o| o.trim().eq_ignore_ascii_case(wanted))
        .or_else(|| match options.as_slice() {
            [yes, no] => Some(if married { yes } else { no }),
            _ => None,
        })
        .cloned()
        .ok_or_else(|| anyhow!("No yes/no option among {:?}", options))?;
    form.select_radio(name, &label)?;
    form.refresh_appearance(name)?;
    Ok(label)
}

/// Typed dispatch: the inspected kind first, then the rest in priority order.
fn write_field(form: &mut AcroForm, field: &str, value: &str) -> Result<WidgetType> {
    let known = form
        .widget_type(field)
        .ok_or_else(|| anyhow!("No form field named {:?}", field))?;

    let order = std::iter::once(known)
        .filter(|k| *k != WidgetType::Unknown)
        .chain(WidgetType::PRIORITY.into_iter().filter(|k| *k != known));

    let mut last_err = anyhow!("{:?} accepted no widget kind", field);
    for kind in order {
        let attempt = match kind {
            WidgetType::Text => form.set_text(field, value),
            WidgetType::Radio => write_radio(form, field, value),
            WidgetType::Checkbox => write_checkbox(form, field, value),
            WidgetType::Dropdown => write_dropdown(form, field, value),
            WidgetType::Unknown => continue,
        };
        match attempt {
            Ok(()) => return Ok(kind),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

fn write_radio(form: &mut AcroForm, field: &str, value: &str) -> Result<()> {
    let options = form.radio_options(field)?;
    let label = match_option(&options, value, true)
        .or_else(|| options.first().cloned())
        .ok_or_else(|| anyhow!("Radio group {:?} has no options", field))?;
    form.select_radio(field, &label)?;
    form.refresh_appearance(field)
}

fn write_checkbox(form: &mut AcroForm, field: &str, value: &str) -> Result<()> {
    form.set_checkbox(field, is_truthy(value))?;
    form.refresh_appearance(field)
}

fn write_dropdown(form: &mut AcroForm, field: &str, value: &str) -> Result<()> {
    let options = form.dropdown_options(field)?;
    let label = match_option(&options, value, false)
        .or_else(|| options.first().cloned())
        .ok_or_else(|| anyhow!("Dropdown {:?} has no options", field))?;
    form.select_dropdown(field, &label)
}

/// Exact (case-insensitive), then substring either way, then for two-option
/// radio groups a yes/no reading of the value: the option labelled like the
/// value's polarity, else first for yes and second for no.
pub fn match_option(options: &[String], value: &str, boolean_pair: bool) -> Option<String> {
    let needle = value.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(o) = options.iter().find(|o| o.trim().to_lowercase() == needle) {
        return Some(o.clone());
    }

    if let Some(o) = options.iter().find(|o| {
        let label = o.trim().to_lowercase();
        !label.is_empty() && (label.contains(&needle) || needle.contains(&label))
    }) {
        return Some(o.clone());
    }

    if boolean_pair && options.len() == 2 {
        let (tokens, position) = if AFFIRMATIVE.contains(&needle.as_str()) {
            (&AFFIRMATIVE, 0)
        } else if NEGATIVE.contains(&needle.as_str()) {
            (&NEGATIVE, 1)
        } else {
            return None;
        };
        // A yes/no style label wins; position only for unlabelled pairs.
        let labelled = options
            .iter()
            .find(|o| tokens.contains(&o.trim().to_lowercase().as_str()));
        return Some(labelled.unwrap_or(&options[position]).clone());
    }
    None
}

pub fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    TRUTHY.contains(&v.as_str())
}

/// (first, last) pairs for the spouse, every dependent row and beneficiary.
fn known_people(flat: &FlattenedFormData) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut people = Vec::new();

    let mut push = |first: &str, last: &str| {
        let (first, last) = (first.trim(), last.trim());
        if !first.is_empty() && !last.is_empty() && seen.insert((first.to_string(), last.to_string())) {
            people.push((first.to_string(), last.to_string()));
        }
    };

    push(flat.value("spouseFirstName"), flat.value("spouseLastName"));
    for (key, first) in flat.iter() {
        if let Some(prefix) = key.strip_suffix("_firstName") {
            push(first.as_str(), flat.value(&format!("{}_lastName", prefix)));
        }
    }
    people
}

/// Rewrites "Last First" / "Last, First" of a known person to "First Last".
fn correct_name_order(value: &str, people: &[(String, String)]) -> String {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    for (first, last) in people {
        let reversed = format!("{} {}", last, first);
        let reversed_comma = format!("{}, {}", last, first);
        if normalized.eq_ignore_ascii_case(&reversed) || normalized.eq_ignore_ascii_case(&reversed_comma) {
            return format_name(first, last);
        }
    }
    value.to_string()
}
