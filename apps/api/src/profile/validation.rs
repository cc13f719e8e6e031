//! Field validators.
//!
//! Every validator is pure and total: it returns `None` when the value is
//! acceptable and `Some(message)` with a user-facing message otherwise.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::models::profile::{Education, Proficiency, SkillLevel, WorkExperience};
use crate::profile::merge::{EntryKey, FieldPath, ListField};

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Field name → message, for validators that cover a whole entry.
pub type FieldErrors = BTreeMap<&'static str, String>;

pub fn validate_email(email: &str) -> Option<String> {
    if email.trim().is_empty() {
        return Some("Email is required".to_string());
    }
    if !EMAIL_SHAPE.is_match(email) {
        return Some("Please enter a valid email address".to_string());
    }
    None
}

/// Phone numbers are optional; when present they must carry 10–15 digits.
pub fn validate_phone(phone: &str) -> Option<String> {
    if phone.trim().is_empty() {
        return None;
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 10 {
        return Some("Phone number must be at least 10 digits".to_string());
    }
    if digits > 15 {
        return Some("Phone number must be no more than 15 digits".to_string());
    }
    None
}

pub fn validate_url(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    match Url::parse(url) {
        Ok(_) => None,
        Err(_) => Some("Please enter a valid URL (e.g., https://example.com)".to_string()),
    }
}

pub fn validate_linkedin_url(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    if let Some(err) = validate_url(url) {
        return Some(err);
    }
    if !url.contains("linkedin.com") {
        return Some("Please enter a valid LinkedIn URL".to_string());
    }
    None
}

pub fn validate_required(value: &str, field_name: &str) -> Option<String> {
    if value.trim().is_empty() {
        return Some(format!("{field_name} is required"));
    }
    None
}

pub fn validate_min_length(value: &str, min_length: usize, field_name: &str) -> Option<String> {
    if value.trim().chars().count() < min_length {
        return Some(format!(
            "{field_name} must be at least {min_length} characters long"
        ));
    }
    None
}

pub fn validate_max_length(value: &str, max_length: usize, field_name: &str) -> Option<String> {
    if value.trim().chars().count() > max_length {
        return Some(format!(
            "{field_name} must be no more than {max_length} characters long"
        ));
    }
    None
}

/// Start must not fall after end. Empty or unparseable dates pass.
pub fn validate_date_range(start_date: &str, end_date: &str) -> Option<String> {
    if start_date.is_empty() || end_date.is_empty() {
        return None;
    }
    match (parse_month_date(start_date), parse_month_date(end_date)) {
        (Some(start), Some(end)) if start > end => {
            Some("Start date must be before end date".to_string())
        }
        _ => None,
    }
}

pub fn validate_gpa(gpa: &str) -> Option<String> {
    let gpa = gpa.trim();
    if gpa.is_empty() {
        return None;
    }
    let value = match leading_float(gpa) {
        Some(v) => v,
        None => return Some("GPA must be a valid number".to_string()),
    };
    if !(0.0..=4.0).contains(&value) {
        return Some("GPA must be between 0.0 and 4.0".to_string());
    }
    None
}

pub fn validate_skill_level(level: &str) -> Option<String> {
    if level.trim().is_empty() {
        return None;
    }
    if !SkillLevel::ALL.contains(&level) {
        return Some("Please select a valid skill level".to_string());
    }
    None
}

pub fn validate_language_proficiency(proficiency: &str) -> Option<String> {
    if proficiency.trim().is_empty() {
        return Some("Language proficiency is required".to_string());
    }
    if !Proficiency::ALL.contains(&proficiency) {
        return Some("Please select a valid proficiency level".to_string());
    }
    None
}

/// Accepts `YYYY-MM` and `YYYY-MM-DD`.
fn parse_month_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .ok()
}

/// Parses the longest numeric prefix, so "3.5 / 4" reads as 3.5.
pub(crate) fn leading_float(value: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in value.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '.' if !seen_dot => seen_dot = true,
            '+' | '-' if i == 0 => {}
            _ => break,
        }
    }
    value[..end].parse::<f64>().ok()
}

// ────────────────────────────────────────────────────────────────────────────
// Composite validators
// ────────────────────────────────────────────────────────────────────────────

fn first_name(value: &str) -> Option<String> {
    validate_required(value, "First name")
}

fn last_name(value: &str) -> Option<String> {
    validate_required(value, "Last name")
}

fn headline(value: &str) -> Option<String> {
    validate_required(value, "Professional headline")
        .or_else(|| validate_max_length(value, 100, "Professional headline"))
}

fn summary_description(value: &str) -> Option<String> {
    validate_required(value, "Professional summary")
        .or_else(|| validate_min_length(value, 100, "Professional summary"))
        .or_else(|| validate_max_length(value, 500, "Professional summary"))
}

fn position(value: &str) -> Option<String> {
    validate_required(value, "Position")
}

fn company(value: &str) -> Option<String> {
    validate_required(value, "Company")
}

fn degree(value: &str) -> Option<String> {
    validate_required(value, "Degree")
}

fn institution(value: &str) -> Option<String> {
    validate_required(value, "Institution")
}

fn start_date(value: &str) -> Option<String> {
    validate_required(value, "Start date")
}

fn experience_description(value: &str) -> Option<String> {
    validate_required(value, "Description")
        .or_else(|| validate_min_length(value, 50, "Description"))
}

/// A single-field rule.
pub type Rule = fn(&str) -> Option<String>;

/// Returns the rule applied to a single profile field, if any. End dates and
/// entry locations are free-form.
pub fn validator_for(path: FieldPath) -> Option<Rule> {
    if let Some((list, _, key)) = path.entry() {
        return entry_rule(list, key);
    }
    let rule: Rule = match path {
        FieldPath::FirstName => first_name,
        FieldPath::LastName => last_name,
        FieldPath::Email => validate_email,
        FieldPath::Phone => validate_phone,
        FieldPath::LinkedinUrl => validate_linkedin_url,
        FieldPath::PortfolioUrl => validate_url,
        FieldPath::Headline => headline,
        FieldPath::SummaryDescription => summary_description,
        _ => return None,
    };
    Some(rule)
}

fn entry_rule(list: ListField, key: EntryKey) -> Option<Rule> {
    let rule: Rule = match (list, key) {
        (ListField::Experience, EntryKey::Position) => position,
        (ListField::Experience, EntryKey::Company) => company,
        (ListField::Experience, EntryKey::Description) => experience_description,
        (ListField::Education, EntryKey::Degree) => degree,
        (ListField::Education, EntryKey::Institution) => institution,
        (ListField::Education, EntryKey::Gpa) => validate_gpa,
        (_, EntryKey::StartDate) => start_date,
        _ => return None,
    };
    Some(rule)
}

/// Runs the rule for `path` against `value`.
pub fn validate_field(path: FieldPath, value: &str) -> Option<String> {
    validator_for(path).and_then(|rule| rule(value))
}

pub fn validate_work_experience(entry: &WorkExperience) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let mut check = |field: &'static str, result: Option<String>| {
        if let Some(msg) = result {
            errors.insert(field, msg);
        }
    };
    check("position", validate_required(&entry.position, "Position"));
    check("company", validate_required(&entry.company, "Company"));
    check(
        "location",
        validate_required(entry.location.as_deref().unwrap_or_default(), "Location"),
    );
    check("startDate", validate_required(&entry.start_date, "Start date"));
    check(
        "description",
        validate_required(&entry.description, "Description")
            .or_else(|| validate_min_length(&entry.description, 50, "Description")),
    );
    check(
        "endDate",
        validate_date_range(&entry.start_date, entry.end_date.as_deref().unwrap_or_default()),
    );
    errors
}

pub fn validate_education(entry: &Education) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let mut check = |field: &'static str, result: Option<String>| {
        if let Some(msg) = result {
            errors.insert(field, msg);
        }
    };
    check("degree", validate_required(&entry.degree, "Degree"));
    check("institution", validate_required(&entry.institution, "Institution"));
    check(
        "location",
        validate_required(entry.location.as_deref().unwrap_or_default(), "Location"),
    );
    check("startDate", validate_required(&entry.start_date, "Start date"));
    check(
        "gpa",
        entry.gpa.and_then(|gpa| validate_gpa(&gpa.to_string())),
    );
    check(
        "endDate",
        validate_date_range(&entry.start_date, entry.end_date.as_deref().unwrap_or_default()),
    );
    errors
}
