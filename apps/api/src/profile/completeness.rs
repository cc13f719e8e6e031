use serde::{Deserialize, Serialize};

use crate::models::profile::Profile;

/// Experience and education denominators stop growing after this many entries.
const MAX_COUNTED_ENTRIES: usize = 2;
const EXPERIENCE_FIELDS: usize = 4;
const EDUCATION_FIELDS: usize = 3;
const EXPECTED_SKILLS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionCompletion {
    pub section: String,
    pub filled: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub completion_percentage: u8,
    pub sections: Vec<SectionCompletion>,
    pub missing_sections: Vec<String>,
}

fn is_filled(value: &str) -> bool {
    !value.trim().is_empty()
}

fn count_filled<'a>(fields: impl IntoIterator<Item = &'a str>) -> usize {
    fields.into_iter().filter(|f| is_filled(f)).count()
}

/// Filled/total field counts for every scored section, in scoring order.
///
/// Denominators are fixed per section: personal info 6, summary 2, links 2,
/// experience 4 per entry (capped at 2 entries, 4 when the list is empty),
/// education 3 per entry (capped at 2 entries, 3 when empty) and skills 5.
/// Filled experience and education fields are counted over every entry.
pub fn section_breakdown(profile: &Profile) -> Vec<SectionCompletion> {
    let info = &profile.personal_info;

    let personal = SectionCompletion {
        section: "personal_info".to_string(),
        filled: count_filled([
            info.first_name.as_str(),
            info.last_name.as_str(),
            info.email.as_str(),
            info.phone.as_str(),
            info.location.city.as_str(),
            info.location.country.as_str(),
        ]),
        total: 6,
    };

    let summary = SectionCompletion {
        section: "summary".to_string(),
        filled: count_filled([
            profile.summary.headline.as_str(),
            profile.summary.description.as_str(),
        ]),
        total: 2,
    };

    let links = SectionCompletion {
        section: "links".to_string(),
        filled: count_filled([info.linkedin_url.as_str(), info.portfolio_url.as_str()]),
        total: 2,
    };

    let experience = SectionCompletion {
        section: "experience".to_string(),
        filled: profile
            .experience
            .iter()
            .map(|e| {
                count_filled([
                    e.company.as_str(),
                    e.position.as_str(),
                    e.start_date.as_str(),
                    e.description.as_str(),
                ])
            })
            .sum(),
        total: entry_denominator(profile.experience.len(), EXPERIENCE_FIELDS),
    };

    let education = SectionCompletion {
        section: "education".to_string(),
        filled: profile
            .education
            .iter()
            .map(|e| {
                count_filled([
                    e.institution.as_str(),
                    e.degree.as_str(),
                    e.start_date.as_str(),
                ])
            })
            .sum(),
        total: entry_denominator(profile.education.len(), EDUCATION_FIELDS),
    };

    let skills = SectionCompletion {
        section: "skills".to_string(),
        filled: profile.skills.count().min(EXPECTED_SKILLS),
        total: EXPECTED_SKILLS,
    };

    vec![personal, summary, links, experience, education, skills]
}

fn entry_denominator(entries: usize, fields_per_entry: usize) -> usize {
    if entries == 0 {
        fields_per_entry
    } else {
        (entries * fields_per_entry).min(MAX_COUNTED_ENTRIES * fields_per_entry)
    }
}

fn percentage(sections: &[SectionCompletion]) -> u8 {
    let filled: usize = sections.iter().map(|s| s.filled).sum();
    let total: usize = sections.iter().map(|s| s.total).sum();
    if total == 0 {
        return 0;
    }
    let pct = (100.0 * filled as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Heuristic 0–100 completeness score for a profile.
pub fn completion_percentage(profile: &Profile) -> u8 {
    percentage(&section_breakdown(profile))
}

pub fn compute_completion_report(profile: &Profile) -> CompletionReport {
    let sections = section_breakdown(profile);
    let completion_percentage = percentage(&sections);
    let missing_sections = sections
        .iter()
        .filter(|s| s.filled == 0)
        .map(|s| s.section.clone())
        .collect();
    CompletionReport {
        completion_percentage,
        sections,
        missing_sections,
    }
}
