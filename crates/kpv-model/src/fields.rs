//! Entry string fields: a case-insensitive map of shrouded text values.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use kpv_core::KpvResult;
use kpv_crypto::ShroudedChars;

use crate::name::FieldName;

/// Field map from case-insensitive name to shrouded text.
///
/// `set` overwrites (last write wins); `add` only fills vacancies (first
/// write wins). Iteration is in case-folded key order. The well-known
/// accessors are plain shortcuts into the same map.
#[derive(Debug, Clone, Default)]
pub struct KpFields {
    entries: BTreeMap<FieldName, ShroudedChars>,
}

impl KpFields {
    pub const TITLE: &'static str = "Title";
    pub const USER_NAME: &'static str = "UserName";
    pub const PASSWORD: &'static str = "Password";
    pub const URL: &'static str = "URL";
    pub const NOTES: &'static str = "Notes";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ShroudedChars> {
        self.entries.get(&FieldName::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&FieldName::new(name))
    }

    /// Fetch a field, lazily materializing an empty value for absent names.
    pub fn get_or_create(&mut self, name: &str) -> KpvResult<&ShroudedChars> {
        match self.entries.entry(FieldName::new(name)) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(ShroudedChars::empty()?)),
        }
    }

    /// Overwrite semantics: the last write wins.
    pub fn set(&mut self, name: &str, value: ShroudedChars) {
        self.entries.insert(FieldName::new(name), value);
    }

    /// First-write-wins: a no-op when the name already exists. Returns
    /// whether the value was stored.
    pub fn add(&mut self, name: &str, value: ShroudedChars) -> bool {
        match self.entries.entry(FieldName::new(name)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(value);
                true
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&FieldName::new(name)).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &ShroudedChars)> {
        self.entries.iter()
    }

    pub fn title(&self) -> Option<&ShroudedChars> {
        self.get(Self::TITLE)
    }

    pub fn user_name(&self) -> Option<&ShroudedChars> {
        self.get(Self::USER_NAME)
    }

    pub fn password(&self) -> Option<&ShroudedChars> {
        self.get(Self::PASSWORD)
    }

    pub fn url(&self) -> Option<&ShroudedChars> {
        self.get(Self::URL)
    }

    pub fn notes(&self) -> Option<&ShroudedChars> {
        self.get(Self::NOTES)
    }

    pub fn set_title(&mut self, value: ShroudedChars) {
        self.set(Self::TITLE, value);
    }

    pub fn set_user_name(&mut self, value: ShroudedChars) {
        self.set(Self::USER_NAME, value);
    }

    pub fn set_password(&mut self, value: ShroudedChars) {
        self.set(Self::PASSWORD, value);
    }

    pub fn set_url(&mut self, value: ShroudedChars) {
        self.set(Self::URL, value);
    }

    pub fn set_notes(&mut self, value: ShroudedChars) {
        self.set(Self::NOTES, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> ShroudedChars {
        ShroudedChars::new(s).unwrap()
    }

    #[test]
    fn test_add_is_first_write_wins() {
        let mut fields = KpFields::new();
        assert!(fields.add("Title", chars("original")));
        assert!(!fields.add("Title", chars("intruder")));

        let value = fields.title().unwrap();
        assert_eq!(value.read_str().unwrap().as_str(), "original");
    }

    #[test]
    fn test_set_is_last_write_wins() {
        let mut fields = KpFields::new();
        fields.add("Title", chars("original"));
        fields.set("Title", chars("replacement"));

        let value = fields.title().unwrap();
        assert_eq!(value.read_str().unwrap().as_str(), "replacement");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut fields = KpFields::new();
        fields.set("Title", chars("cased"));

        assert!(fields.contains("TITLE"));
        assert!(fields.contains("title"));
        fields.set("tItLe", chars("recased"));
        assert_eq!(fields.len(), 1);
        assert_eq!(
            fields.get("TITLE").unwrap().read_str().unwrap().as_str(),
            "recased"
        );
    }

    #[test]
    fn test_get_or_create_materializes_empty() {
        let mut fields = KpFields::new();
        assert!(fields.get("Notes").is_none());

        let value = fields.get_or_create("Notes").unwrap();
        assert!(value.is_empty());
        assert_eq!(fields.len(), 1);

        // does not clobber an existing value
        fields.set("Notes", chars("kept"));
        let value = fields.get_or_create("Notes").unwrap();
        assert_eq!(value.read_str().unwrap().as_str(), "kept");
    }

    #[test]
    fn test_well_known_accessors_share_the_map() {
        let mut fields = KpFields::new();
        fields.set_user_name(chars("alice"));
        fields.set_password(chars("hunter2"));
        fields.set_url(chars("https://example.test"));
        fields.set_notes(chars("note"));
        fields.set_title(chars("Example"));

        assert_eq!(fields.len(), 5);
        assert_eq!(
            fields.get("password").unwrap().read_str().unwrap().as_str(),
            "hunter2"
        );
        assert_eq!(
            fields.user_name().unwrap().read_str().unwrap().as_str(),
            "alice"
        );
    }

    #[test]
    fn test_iteration_in_key_order() {
        let mut fields = KpFields::new();
        fields.set("URL", chars("u"));
        fields.set("Notes", chars("n"));
        fields.set("Title", chars("t"));

        let order: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, ["Notes", "Title", "URL"]);
    }

    #[test]
    fn test_remove() {
        let mut fields = KpFields::new();
        fields.set("Title", chars("x"));
        assert!(fields.remove("title"));
        assert!(!fields.remove("title"));
        assert!(fields.is_empty());
    }
}
