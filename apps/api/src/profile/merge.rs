//! Profile reconciliation: deep-merging partial updates into the aggregate.
//!
//! Updates are addressed with [`FieldPath`], a closed set of the profile's
//! known field paths plus indexed entry fields (`experience[0].position`).
//! A named path expands into a nested delta document which is then
//! deep-merged into the profile document:
//!
//! - `null`/absent delta values keep the target value
//! - arrays replace the target list wholesale
//! - objects recurse key-by-key, creating missing substructures
//! - any other value overwrites
//!
//! Entry fields are applied after the merge, straight into the addressed
//! list element. Nothing here mutates its inputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::profile::{new_entry_id, Profile};
use crate::profile::validation::leading_float;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Unknown profile field '{0}'")]
    UnknownField(String),

    #[error("Update does not fit the profile document: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("{field} has no entry at index {index} (length {len})")]
    IndexOutOfRange {
        field: ListField,
        index: usize,
        len: usize,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Field paths
// ────────────────────────────────────────────────────────────────────────────

/// Every addressable field of the profile document.
///
/// `Entry` addresses one text field of an experience or education entry by
/// position; it is written as `experience[1].company`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldPath {
    FirstName,
    LastName,
    Email,
    Phone,
    City,
    Country,
    LinkedinUrl,
    PortfolioUrl,
    Headline,
    SummaryDescription,
    Experience,
    Education,
    SkillsTechnical,
    SkillsSoft,
    SkillsLanguages,
    Entry {
        list: ListField,
        index: usize,
        key: EntryKey,
    },
}

impl FieldPath {
    pub const ALL: [FieldPath; 15] = [
        FieldPath::FirstName,
        FieldPath::LastName,
        FieldPath::Email,
        FieldPath::Phone,
        FieldPath::City,
        FieldPath::Country,
        FieldPath::LinkedinUrl,
        FieldPath::PortfolioUrl,
        FieldPath::Headline,
        FieldPath::SummaryDescription,
        FieldPath::Experience,
        FieldPath::Education,
        FieldPath::SkillsTechnical,
        FieldPath::SkillsSoft,
        FieldPath::SkillsLanguages,
    ];

    /// Document keys from the root down to the field. Entry paths stop at
    /// their list.
    pub fn segments(self) -> &'static [&'static str] {
        match self {
            FieldPath::FirstName => &["personalInfo", "firstName"],
            FieldPath::LastName => &["personalInfo", "lastName"],
            FieldPath::Email => &["personalInfo", "email"],
            FieldPath::Phone => &["personalInfo", "phone"],
            FieldPath::City => &["personalInfo", "location", "city"],
            FieldPath::Country => &["personalInfo", "location", "country"],
            FieldPath::LinkedinUrl => &["personalInfo", "linkedinUrl"],
            FieldPath::PortfolioUrl => &["personalInfo", "portfolioUrl"],
            FieldPath::Headline => &["summary", "headline"],
            FieldPath::SummaryDescription => &["summary", "description"],
            FieldPath::Experience => &["experience"],
            FieldPath::Education => &["education"],
            FieldPath::SkillsTechnical => &["skills", "technical"],
            FieldPath::SkillsSoft => &["skills", "soft"],
            FieldPath::SkillsLanguages => &["skills", "languages"],
            FieldPath::Entry { list, .. } => list.path().segments(),
        }
    }

    pub fn dotted(self) -> String {
        match self {
            FieldPath::Entry { list, index, key } => format!("{list}[{index}].{key}"),
            named => named.segments().join("."),
        }
    }

    /// JSON pointer into the profile document, e.g. `/personalInfo/email`
    /// or `/experience/0/position`.
    pub fn pointer(self) -> String {
        let base = self
            .segments()
            .iter()
            .fold(String::new(), |acc, s| format!("{acc}/{s}"));
        match self {
            FieldPath::Entry { index, key, .. } => format!("{base}/{index}/{key}"),
            _ => base,
        }
    }

    pub fn is_list(self) -> bool {
        ListField::from_path(self).is_some()
    }

    /// The list and index an entry path points into.
    pub fn entry(self) -> Option<(ListField, usize, EntryKey)> {
        match self {
            FieldPath::Entry { list, index, key } => Some((list, index, key)),
            _ => None,
        }
    }

    /// Reads the current value of the field out of `profile`.
    pub fn read(self, profile: &Profile) -> Result<Value, ReconcileError> {
        let doc = serde_json::to_value(profile)?;
        Ok(doc.pointer(&self.pointer()).cloned().unwrap_or(Value::Null))
    }

    /// Reads a scalar field as text; lists and missing values read as empty.
    pub fn read_text(self, profile: &Profile) -> Result<String, ReconcileError> {
        Ok(match self.read(profile)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

/// Resolves dotted names against the known paths only; arbitrary paths are
/// rejected rather than created.
impl FromStr for FieldPath {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = FieldPath::ALL
            .into_iter()
            .find(|p| p.segments().iter().copied().eq(s.split('.')))
        {
            return Ok(path);
        }
        parse_entry_path(s).ok_or_else(|| ReconcileError::UnknownField(s.to_string()))
    }
}

/// `experience[2].startDate` → `Entry { Experience, 2, StartDate }`.
fn parse_entry_path(s: &str) -> Option<FieldPath> {
    let (list, rest) = s.split_once('[')?;
    let (index, key) = rest.split_once("].")?;
    let list: ListField = list.parse().ok()?;
    let index: usize = index.parse().ok()?;
    let key: EntryKey = key.parse().ok()?;
    key.belongs_to(list)
        .then_some(FieldPath::Entry { list, index, key })
}

impl TryFrom<String> for FieldPath {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.dotted()
    }
}

/// The ordered lists of the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ListField {
    Experience,
    Education,
    SkillsTechnical,
    SkillsSoft,
    SkillsLanguages,
}

impl ListField {
    pub fn path(self) -> FieldPath {
        match self {
            ListField::Experience => FieldPath::Experience,
            ListField::Education => FieldPath::Education,
            ListField::SkillsTechnical => FieldPath::SkillsTechnical,
            ListField::SkillsSoft => FieldPath::SkillsSoft,
            ListField::SkillsLanguages => FieldPath::SkillsLanguages,
        }
    }

    pub fn from_path(path: FieldPath) -> Option<Self> {
        match path {
            FieldPath::Experience => Some(ListField::Experience),
            FieldPath::Education => Some(ListField::Education),
            FieldPath::SkillsTechnical => Some(ListField::SkillsTechnical),
            FieldPath::SkillsSoft => Some(ListField::SkillsSoft),
            FieldPath::SkillsLanguages => Some(ListField::SkillsLanguages),
            _ => None,
        }
    }

    fn read(self, profile: &Profile) -> Result<Vec<Value>, ReconcileError> {
        Ok(match self.path().read(profile)? {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }
}

impl fmt::Display for ListField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path().fmt(f)
    }
}

impl FromStr for ListField {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path: FieldPath = s.parse()?;
        ListField::from_path(path).ok_or_else(|| ReconcileError::UnknownField(s.to_string()))
    }
}

impl TryFrom<String> for ListField {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListField> for String {
    fn from(field: ListField) -> Self {
        field.path().dotted()
    }
}

/// Inline-editable fields of experience and education entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    Position,
    Company,
    Degree,
    Institution,
    StartDate,
    EndDate,
    Location,
    Description,
    Gpa,
}

impl EntryKey {
    pub const ALL: [EntryKey; 9] = [
        EntryKey::Position,
        EntryKey::Company,
        EntryKey::Degree,
        EntryKey::Institution,
        EntryKey::StartDate,
        EntryKey::EndDate,
        EntryKey::Location,
        EntryKey::Description,
        EntryKey::Gpa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKey::Position => "position",
            EntryKey::Company => "company",
            EntryKey::Degree => "degree",
            EntryKey::Institution => "institution",
            EntryKey::StartDate => "startDate",
            EntryKey::EndDate => "endDate",
            EntryKey::Location => "location",
            EntryKey::Description => "description",
            EntryKey::Gpa => "gpa",
        }
    }

    /// Whether entries of `list` carry this key.
    pub fn belongs_to(self, list: ListField) -> bool {
        use EntryKey::*;
        match list {
            ListField::Experience => matches!(
                self,
                Position | Company | StartDate | EndDate | Location | Description
            ),
            ListField::Education => matches!(
                self,
                Degree | Institution | StartDate | EndDate | Location | Gpa
            ),
            _ => false,
        }
    }

    /// The stored value for edited text. Empty text clears the optional keys
    /// and GPA is kept as a number.
    pub fn value_from_text(self, text: &str) -> Value {
        let trimmed = text.trim();
        match self {
            EntryKey::EndDate | EntryKey::Location | EntryKey::Gpa if trimmed.is_empty() => {
                Value::Null
            }
            EntryKey::Gpa => leading_float(trimmed)
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| Value::String(text.to_string()), Value::Number),
            _ => Value::String(text.to_string()),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKey {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ReconcileError::UnknownField(s.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Deep merge
// ────────────────────────────────────────────────────────────────────────────

/// Deep-merges `delta` into `target`, returning the merged value.
pub fn deep_merge(target: &Value, delta: &Value) -> Value {
    match delta {
        Value::Null => target.clone(),
        Value::Object(delta_map) => {
            let mut merged = match target {
                Value::Object(target_map) => target_map.clone(),
                _ => Map::new(),
            };
            for (key, delta_value) in delta_map {
                if delta_value.is_null() {
                    continue;
                }
                let next = deep_merge(merged.get(key).unwrap_or(&Value::Null), delta_value);
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        // Arrays replace wholesale; scalars overwrite.
        other => other.clone(),
    }
}

/// Turns `["a", "b", "c"]` + `v` into `{"a": {"b": {"c": v}}}`.
pub fn expand_path(segments: &[&str], value: Value) -> Value {
    segments.iter().rev().fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert((*key).to_string(), inner);
        Value::Object(map)
    })
}

/// A single `path = value` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub path: FieldPath,
    pub value: Value,
}

/// A nested partial profile document built from field updates, plus the
/// entry fields to overwrite once it is merged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileDelta {
    doc: Value,
    entries: Vec<EntryEdit>,
}

#[derive(Debug, Clone, PartialEq)]
struct EntryEdit {
    list: ListField,
    index: usize,
    key: EntryKey,
    value: Value,
}

impl EntryEdit {
    /// Writes the value into the addressed element; `null` removes the key.
    fn apply(&self, doc: &mut Value) -> Result<(), ReconcileError> {
        let items = doc
            .pointer_mut(&self.list.path().pointer())
            .and_then(Value::as_array_mut);
        let len = items.as_ref().map_or(0, |items| items.len());
        let entry = items
            .and_then(|items| items.get_mut(self.index))
            .and_then(Value::as_object_mut)
            .ok_or(ReconcileError::IndexOutOfRange {
                field: self.list,
                index: self.index,
                len,
            })?;
        let key = self.key.as_str().to_string();
        if self.value.is_null() {
            entry.remove(&key);
        } else {
            entry.insert(key, self.value.clone());
        }
        Ok(())
    }
}

impl ProfileDelta {
    pub fn new() -> Self {
        Self {
            doc: Value::Object(Map::new()),
            entries: Vec::new(),
        }
    }

    /// Text given for an entry field is stored through
    /// [`EntryKey::value_from_text`].
    pub fn set(mut self, path: FieldPath, value: Value) -> Self {
        match path {
            FieldPath::Entry { list, index, key } => {
                let value = match value {
                    Value::String(text) => key.value_from_text(&text),
                    other => other,
                };
                self.entries.push(EntryEdit {
                    list,
                    index,
                    key,
                    value,
                });
            }
            named => {
                let expanded = expand_path(named.segments(), value);
                self.doc = deep_merge(&self.doc, &expanded);
            }
        }
        self
    }

    pub fn from_updates<I>(updates: I) -> Self
    where
        I: IntoIterator<Item = FieldUpdate>,
    {
        updates
            .into_iter()
            .fold(Self::new(), |delta, u| delta.set(u.path, u.value))
    }
}

/// Merges `delta` into `target` and returns the new profile.
///
/// `id` and `metadata` are owned by the persistence path and are never taken
/// from a delta.
pub fn reconcile(target: &Profile, delta: &ProfileDelta) -> Result<Profile, ReconcileError> {
    let mut delta_doc = delta.doc.clone();
    if let Value::Object(map) = &mut delta_doc {
        map.remove("id");
        map.remove("metadata");
    }
    let target_doc = serde_json::to_value(target)?;
    let mut merged = deep_merge(&target_doc, &delta_doc);
    for edit in &delta.entries {
        edit.apply(&mut merged)?;
    }
    let mut profile: Profile = serde_json::from_value(merged)?;
    profile.id = target.id.clone();
    profile.metadata = target.metadata.clone();
    Ok(profile)
}

// ────────────────────────────────────────────────────────────────────────────
// List operations
// ────────────────────────────────────────────────────────────────────────────

/// Appends `entry` to `field`. Object entries get a freshly generated id.
pub fn append_entry(
    profile: &Profile,
    field: ListField,
    entry: Value,
) -> Result<ProfileDelta, ReconcileError> {
    let mut items = field.read(profile)?;
    let entry = match entry {
        Value::Object(mut map) => {
            map.insert("id".to_string(), Value::String(new_entry_id()));
            Value::Object(map)
        }
        other => other,
    };
    items.push(entry);
    Ok(ProfileDelta::new().set(field.path(), Value::Array(items)))
}

/// Shallow-merges `partial` into the entry at `index`, keeping its id.
/// A `null` value removes the key.
pub fn update_entry(
    profile: &Profile,
    field: ListField,
    index: usize,
    partial: Value,
) -> Result<ProfileDelta, ReconcileError> {
    let mut items = field.read(profile)?;
    let len = items.len();
    let slot = items
        .get_mut(index)
        .ok_or(ReconcileError::IndexOutOfRange { field, index, len })?;
    let updated = match (&*slot, partial) {
        (Value::Object(existing), Value::Object(changes)) => {
            let mut merged = existing.clone();
            for (key, value) in changes {
                if key == "id" {
                    continue;
                }
                if value.is_null() {
                    merged.remove(&key);
                } else {
                    merged.insert(key, value);
                }
            }
            Value::Object(merged)
        }
        (_, replacement) => replacement,
    };
    *slot = updated;
    Ok(ProfileDelta::new().set(field.path(), Value::Array(items)))
}

pub fn remove_entry(
    profile: &Profile,
    field: ListField,
    index: usize,
) -> Result<ProfileDelta, ReconcileError> {
    let mut items = field.read(profile)?;
    let len = items.len();
    if index >= len {
        return Err(ReconcileError::IndexOutOfRange { field, index, len });
    }
    items.remove(index);
    Ok(ProfileDelta::new().set(field.path(), Value::Array(items)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::profile::completeness::tests::full_profile;

    #[test]
    fn test_merge_with_empty_delta_is_identity() {
        let p = serde_json::to_value(full_profile()).unwrap();
        assert_eq!(deep_merge(&p, &json!({})), p);

        let profile = full_profile();
        assert_eq!(reconcile(&profile, &ProfileDelta::new()).unwrap(), profile);
    }

    #[test]
    fn test_arrays_replace_not_concatenate() {
        let merged = deep_merge(&json!({"a": [1, 2]}), &json!({"a": [3]}));
        assert_eq!(merged, json!({"a": [3]}));
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let target = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        let delta = json!({"a": {"b": 2, "c": [9]}, "e": true});
        let target_before = target.clone();
        let delta_before = delta.clone();
        let merged = deep_merge(&target, &delta);
        assert_eq!(target, target_before);
        assert_eq!(delta, delta_before);
        assert_eq!(merged, json!({"a": {"b": 2, "c": [9]}, "d": "x", "e": true}));
    }

    #[test]
    fn test_null_keeps_target_value() {
        let merged = deep_merge(&json!({"a": 1, "b": 2}), &json!({"a": null, "b": 3}));
        assert_eq!(merged, json!({"a": 1, "b": 3}));
        assert_eq!(deep_merge(&json!({"a": 1}), &Value::Null), json!({"a": 1}));
    }

    #[test]
    fn test_nested_objects_merge_and_are_created() {
        let merged = deep_merge(
            &json!({"info": {"name": "Ada", "loc": {"city": "London"}}}),
            &json!({"info": {"loc": {"country": "UK"}}, "fresh": {"k": 1}}),
        );
        assert_eq!(
            merged,
            json!({
                "info": {"name": "Ada", "loc": {"city": "London", "country": "UK"}},
                "fresh": {"k": 1}
            })
        );
    }

    #[test]
    fn test_object_over_scalar_replaces_with_object() {
        let merged = deep_merge(&json!({"a": 5}), &json!({"a": {"b": 1}}));
        assert_eq!(merged, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_expand_dotted_path() {
        let path: FieldPath = "personalInfo.location.city".parse().unwrap();
        assert_eq!(path, FieldPath::City);
        assert_eq!(
            expand_path(path.segments(), json!("Paris")),
            json!({"personalInfo": {"location": {"city": "Paris"}}})
        );
    }

    #[test]
    fn test_unknown_path_rejected() {
        assert!(matches!(
            "personalInfo.shoeSize".parse::<FieldPath>(),
            Err(ReconcileError::UnknownField(_))
        ));
        assert!("personalInfo".parse::<FieldPath>().is_err());
        assert!("summary.headline".parse::<ListField>().is_err());
    }

    #[test]
    fn test_field_path_serde_uses_dotted_names() {
        let update: FieldUpdate =
            serde_json::from_value(json!({"path": "summary.headline", "value": "Hi"})).unwrap();
        assert_eq!(update.path, FieldPath::Headline);
        assert_eq!(
            serde_json::to_value(FieldPath::SkillsSoft).unwrap(),
            json!("skills.soft")
        );
    }

    #[test]
    fn test_reconcile_updates_nested_field_only() {
        let profile = full_profile();
        let delta = ProfileDelta::new().set(FieldPath::City, json!("Paris"));
        let merged = reconcile(&profile, &delta).unwrap();
        assert_eq!(merged.personal_info.location.city, "Paris");
        assert_eq!(merged.personal_info.location.country, "UK");
        assert_eq!(merged.personal_info.first_name, "Ada");
        // Input untouched
        assert_eq!(profile.personal_info.location.city, "London");
    }

    #[test]
    fn test_reconcile_combines_updates() {
        let profile = full_profile();
        let delta = ProfileDelta::from_updates(vec![
            FieldUpdate {
                path: FieldPath::City,
                value: json!("Paris"),
            },
            FieldUpdate {
                path: FieldPath::Country,
                value: json!("FR"),
            },
            FieldUpdate {
                path: FieldPath::SkillsSoft,
                value: json!([]),
            },
        ]);
        let merged = reconcile(&profile, &delta).unwrap();
        assert_eq!(merged.personal_info.location.city, "Paris");
        assert_eq!(merged.personal_info.location.country, "FR");
        assert!(merged.skills.soft.is_empty());
        assert_eq!(merged.skills.technical.len(), 3);
    }

    #[test]
    fn test_reconcile_never_takes_id_or_metadata() {
        let profile = full_profile();
        let mut delta = ProfileDelta::new();
        delta.doc = json!({"id": "intruder", "metadata": {"version": 99, "completionPercentage": 100}});
        let merged = reconcile(&profile, &delta).unwrap();
        assert_eq!(merged.id, profile.id);
        assert_eq!(merged.metadata, profile.metadata);
    }

    #[test]
    fn test_reconcile_rejects_wrong_shape() {
        let profile = full_profile();
        let delta = ProfileDelta::new().set(FieldPath::Experience, json!("not a list"));
        assert!(matches!(
            reconcile(&profile, &delta),
            Err(ReconcileError::Shape(_))
        ));
    }

    #[test]
    fn test_append_assigns_fresh_ids() {
        let profile = full_profile();
        let first = append_entry(
            &profile,
            ListField::Experience,
            json!({"company": "Initech", "id": "client-supplied"}),
        )
        .unwrap();
        let merged = reconcile(&profile, &first).unwrap();
        assert_eq!(merged.experience.len(), 3);
        let added = &merged.experience[2];
        assert_eq!(added.company, "Initech");
        assert_ne!(added.id, "client-supplied");

        let second = append_entry(&merged, ListField::Experience, json!({"company": "Hooli"})).unwrap();
        let merged = reconcile(&merged, &second).unwrap();
        assert_ne!(merged.experience[2].id, merged.experience[3].id);
    }

    #[test]
    fn test_update_entry_keeps_id_and_other_fields() {
        let profile = full_profile();
        let delta = update_entry(
            &profile,
            ListField::Education,
            1,
            json!({"degree": "MSc", "id": "other"}),
        )
        .unwrap();
        let merged = reconcile(&profile, &delta).unwrap();
        assert_eq!(merged.education[1].degree, "MSc");
        assert_eq!(merged.education[1].id, "edu-2");
        assert_eq!(merged.education[1].institution, "MIT");
        assert_eq!(merged.education[0].degree, "BSc");
    }

    #[test]
    fn test_remove_entry_by_index() {
        let profile = full_profile();
        let delta = remove_entry(&profile, ListField::SkillsTechnical, 0).unwrap();
        let merged = reconcile(&profile, &delta).unwrap();
        let names: Vec<_> = merged.skills.technical.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["SQL", "Math"]);
    }

    #[test]
    fn test_list_index_out_of_range() {
        let profile = full_profile();
        assert!(matches!(
            remove_entry(&profile, ListField::Education, 2),
            Err(ReconcileError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
        assert!(update_entry(&profile, ListField::SkillsLanguages, 5, json!({})).is_err());
    }

    #[test]
    fn test_read_text() {
        let profile = full_profile();
        assert_eq!(FieldPath::City.read_text(&profile).unwrap(), "London");
        assert_eq!(FieldPath::Experience.read_text(&profile).unwrap(), "");
        assert!(FieldPath::Experience.is_list());
        assert!(!FieldPath::Email.is_list());
    }

    #[test]
    fn test_entry_paths_parse_and_print() {
        let path: FieldPath = "experience[1].startDate".parse().unwrap();
        assert_eq!(
            path,
            FieldPath::Entry {
                list: ListField::Experience,
                index: 1,
                key: EntryKey::StartDate,
            }
        );
        assert_eq!(path.to_string(), "experience[1].startDate");
        assert_eq!(path.pointer(), "/experience/1/startDate");
        assert!(!path.is_list());

        // Keys must belong to the list
        assert!("experience[0].gpa".parse::<FieldPath>().is_err());
        assert!("education[0].company".parse::<FieldPath>().is_err());
        assert!("skills.soft[0].name".parse::<FieldPath>().is_err());
        assert!("experience[x].position".parse::<FieldPath>().is_err());
    }

    #[test]
    fn test_reconcile_entry_field_touches_one_key() {
        let profile = full_profile();
        let path: FieldPath = "experience[1].company".parse().unwrap();
        let merged = reconcile(&profile, &ProfileDelta::new().set(path, json!("Initech"))).unwrap();
        assert_eq!(merged.experience[1].company, "Initech");
        assert_eq!(merged.experience[1].id, profile.experience[1].id);
        assert_eq!(merged.experience[1].position, profile.experience[1].position);
        assert_eq!(merged.experience[0], profile.experience[0]);
        assert_eq!(path.read_text(&merged).unwrap(), "Initech");
    }

    #[test]
    fn test_entry_gpa_is_stored_as_number_and_cleared_by_empty_text() {
        let profile = full_profile();
        let gpa: FieldPath = "education[0].gpa".parse().unwrap();

        let merged = reconcile(&profile, &ProfileDelta::new().set(gpa, json!("3.5"))).unwrap();
        assert_eq!(merged.education[0].gpa, Some(3.5));
        assert_eq!(gpa.read_text(&merged).unwrap(), "3.5");

        let cleared = reconcile(&merged, &ProfileDelta::new().set(gpa, json!(""))).unwrap();
        assert_eq!(cleared.education[0].gpa, None);
        assert_eq!(gpa.read_text(&cleared).unwrap(), "");
    }

    #[test]
    fn test_entry_field_out_of_range() {
        let profile = full_profile();
        let path: FieldPath = "education[7].degree".parse().unwrap();
        assert!(matches!(
            reconcile(&profile, &ProfileDelta::new().set(path, json!("PhD"))),
            Err(ReconcileError::IndexOutOfRange { index: 7, len: 2, .. })
        ));
    }

    #[test]
    fn test_update_entry_null_removes_optional_key() {
        let profile = full_profile();
        let delta =
            update_entry(&profile, ListField::Experience, 0, json!({"endDate": "2021-06"})).unwrap();
        let ended = reconcile(&profile, &delta).unwrap();
        assert_eq!(ended.experience[0].end_date.as_deref(), Some("2021-06"));

        let delta = update_entry(&ended, ListField::Experience, 0, json!({"endDate": null})).unwrap();
        let merged = reconcile(&ended, &delta).unwrap();
        assert_eq!(merged.experience[0].end_date, None);
        assert_eq!(merged.experience[0].company, "Acme");
    }
}
