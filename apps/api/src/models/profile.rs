use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::Identity;
use crate::profile::completeness::completion_percentage;

/// The user's aggregate profile document.
///
/// Serialized camelCase so the stored document keeps the nested key/value
/// shape clients read and write (`personalInfo.location.city`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub id: String,
    pub personal_info: PersonalInfo,
    pub summary: Summary,
    pub experience: Vec<WorkExperience>,
    pub education: Vec<Education>,
    pub skills: Skills,
    pub metadata: ProfileMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub location: Location,
    pub linkedin_url: String,
    pub portfolio_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub headline: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkExperience {
    pub id: String,
    pub company: String,
    pub position: String,
    /// `YYYY-MM`
    pub start_date: String,
    /// `None` for the current position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub description: String,
    pub achievements: Vec<String>,
    pub technologies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub id: String,
    pub institution: String,
    pub degree: String,
    pub field: String,
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<f64>,
    pub achievements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub const ALL: [&'static str; 4] = ["Beginner", "Intermediate", "Advanced", "Expert"];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proficiency {
    #[default]
    Basic,
    Conversational,
    Fluent,
    Native,
}

impl Proficiency {
    pub const ALL: [&'static str; 4] = ["Basic", "Conversational", "Fluent", "Native"];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Skill {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub level: SkillLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_of_experience: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Language {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub proficiency: Proficiency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Skills {
    pub technical: Vec<Skill>,
    pub soft: Vec<Skill>,
    pub languages: Vec<Language>,
}

impl Skills {
    /// Total number of skill and language entries.
    pub fn count(&self) -> usize {
        self.technical.len() + self.soft.len() + self.languages.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileMetadata {
    /// Always derived from field values right before a persist.
    pub completion_percentage: u8,
    pub last_updated: DateTime<Utc>,
    pub version: u64,
}

impl Default for ProfileMetadata {
    fn default() -> Self {
        Self {
            completion_percentage: 0,
            last_updated: DateTime::<Utc>::default(),
            version: 1,
        }
    }
}

impl Profile {
    /// Builds the first profile for a user who has never saved one.
    ///
    /// The display name is split on spaces into first and last name; email
    /// comes straight from the identity provider.
    pub fn initial(identity: &Identity) -> Self {
        let display_name = identity.display_name.as_deref().unwrap_or_default();
        let mut parts = display_name.split(' ');
        let first_name = parts.next().unwrap_or_default().to_string();
        let last_name = parts.next().unwrap_or_default().to_string();

        let mut profile = Profile {
            id: identity.id.clone(),
            personal_info: PersonalInfo {
                first_name,
                last_name,
                email: identity.email.clone().unwrap_or_default(),
                ..PersonalInfo::default()
            },
            metadata: ProfileMetadata {
                completion_percentage: 0,
                last_updated: Utc::now(),
                version: 1,
            },
            ..Profile::default()
        };
        profile.metadata.completion_percentage = completion_percentage(&profile);
        profile
    }
}

/// Locally generated identifier for a new list entry.
pub fn new_entry_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: Option<&str>) -> Identity {
        Identity {
            id: "user-1".to_string(),
            email: Some("ada@example.com".to_string()),
            display_name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_initial_profile_splits_display_name() {
        let p = Profile::initial(&identity(Some("Ada Lovelace")));
        assert_eq!(p.id, "user-1");
        assert_eq!(p.personal_info.first_name, "Ada");
        assert_eq!(p.personal_info.last_name, "Lovelace");
        assert_eq!(p.personal_info.email, "ada@example.com");
        assert_eq!(p.metadata.version, 1);
        assert!(p.experience.is_empty());
    }

    #[test]
    fn test_initial_profile_without_name() {
        let p = Profile::initial(&identity(None));
        assert_eq!(p.personal_info.first_name, "");
        assert_eq!(p.personal_info.last_name, "");
    }

    #[test]
    fn test_initial_profile_has_computed_completion() {
        let p = Profile::initial(&identity(Some("Ada Lovelace")));
        assert_eq!(p.metadata.completion_percentage, completion_percentage(&p));
        assert!(p.metadata.completion_percentage > 0);
    }

    #[test]
    fn test_document_shape_is_camel_case() {
        let p = Profile::initial(&identity(Some("Ada Lovelace")));
        let doc = serde_json::to_value(&p).unwrap();
        assert_eq!(doc["personalInfo"]["firstName"], "Ada");
        assert_eq!(doc["personalInfo"]["location"]["city"], "");
        assert_eq!(doc["metadata"]["version"], 1);
        assert!(doc["skills"]["technical"].is_array());
    }

    #[test]
    fn test_partial_document_deserializes_with_defaults() {
        let doc = serde_json::json!({
            "id": "u",
            "personalInfo": { "firstName": "Grace" }
        });
        let p: Profile = serde_json::from_value(doc).unwrap();
        assert_eq!(p.personal_info.first_name, "Grace");
        assert_eq!(p.personal_info.location.country, "");
        assert_eq!(p.metadata.version, 1);
    }
}
