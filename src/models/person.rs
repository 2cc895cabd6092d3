//! Extracted person records and the merge rules for writing them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored person row, keyed by profile URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    /// Natural key. Extraction batches upsert against this.
    pub profile_url: String,
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub connection_degree: Option<String>,
    /// Latest raw extraction object for this person.
    pub profile_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonRecord {
    /// New row seeded from one extracted profile.
    pub fn from_profile(data: &ProfileData) -> Option<Self> {
        let profile_url = data.profile_url()?;
        let now = Utc::now();
        let mut record = Self {
            id: Uuid::new_v4().to_string(),
            profile_url,
            full_name: None,
            title: None,
            company_name: None,
            location: None,
            email: None,
            phone: None,
            connection_degree: None,
            profile_data: data.raw.clone(),
            created_at: now,
            updated_at: now,
        };
        record.merge(data);
        Some(record)
    }

    /// Merge newly extracted values in. A blank incoming field never
    /// overwrites an existing non-blank one. Returns whether any stored
    /// field changed.
    pub fn merge(&mut self, data: &ProfileData) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.full_name, data.full_name.as_deref());
        changed |= merge_field(&mut self.title, data.title.as_deref());
        changed |= merge_field(&mut self.company_name, data.company_name.as_deref());
        changed |= merge_field(&mut self.location, data.location.as_deref());
        changed |= merge_field(&mut self.email, data.email.as_deref());
        changed |= merge_field(&mut self.phone, data.phone.as_deref());
        changed |= merge_field(&mut self.connection_degree, data.connection_degree.as_deref());
        if changed {
            self.profile_data = data.raw.clone();
            self.updated_at = Utc::now();
        }
        changed
    }
}

fn merge_field(existing: &mut Option<String>, incoming: Option<&str>) -> bool {
    match incoming.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) if existing.as_deref() != Some(value) => {
            *existing = Some(value.to_string());
            true
        }
        _ => false,
    }
}

/// One profile object as extracted by the phantom, with the provider's
/// inconsistent key naming already resolved.
#[derive(Debug, Clone)]
pub struct ProfileData {
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub connection_degree: Option<String>,
    /// Original object, stored verbatim on the person row.
    pub raw: serde_json::Value,
}

impl ProfileData {
    /// Parse one element of a result array. Accepts the key variants the
    /// provider has been seen to emit across agent versions.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            full_name: string_key(value, &["fullName", "name"]),
            title: string_key(value, &["title", "jobTitle"]),
            company_name: string_key(value, &["companyName", "company"]),
            location: string_key(value, &["location"]),
            email: string_key(value, &["email"]),
            phone: string_key(value, &["phoneNumber", "phone"]),
            connection_degree: string_key(value, &["connectionDegree"]),
            raw: value.clone(),
        }
    }

    /// Natural upsert key. Sales Navigator exports carry the canonical URL
    /// under `defaultProfileUrl`; older agents used the other two.
    pub fn profile_url(&self) -> Option<String> {
        string_key(
            &self.raw,
            &["defaultProfileUrl", "linkedInProfileUrl", "profileUrl"],
        )
    }

    /// Entries without a natural key cannot be upserted and are skipped.
    pub fn is_usable(&self) -> bool {
        self.profile_url().is_some()
    }
}

fn string_key(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Outcome counts for one persisted result batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl UpsertCounts {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(json: serde_json::Value) -> ProfileData {
        ProfileData::from_value(&json)
    }

    #[test]
    fn test_profile_key_variants() {
        let data = profile(serde_json::json!({
            "name": "Kari Nordmann",
            "jobTitle": "CTO",
            "company": "Fjordware AS",
            "linkedInProfileUrl": "https://linkedin.com/in/kari"
        }));
        assert_eq!(data.full_name.as_deref(), Some("Kari Nordmann"));
        assert_eq!(data.title.as_deref(), Some("CTO"));
        assert_eq!(data.company_name.as_deref(), Some("Fjordware AS"));
        assert_eq!(
            data.profile_url().as_deref(),
            Some("https://linkedin.com/in/kari")
        );
    }

    #[test]
    fn test_default_profile_url_preferred() {
        let data = profile(serde_json::json!({
            "defaultProfileUrl": "https://linkedin.com/in/canonical",
            "profileUrl": "https://linkedin.com/sales/people/123"
        }));
        assert_eq!(
            data.profile_url().as_deref(),
            Some("https://linkedin.com/in/canonical")
        );
    }

    #[test]
    fn test_unusable_without_url() {
        let data = profile(serde_json::json!({"fullName": "No Url"}));
        assert!(!data.is_usable());
        assert!(PersonRecord::from_profile(&data).is_none());
    }

    #[test]
    fn test_blank_never_overwrites() {
        let first = profile(serde_json::json!({
            "profileUrl": "https://linkedin.com/in/ola",
            "fullName": "Ola Nordmann",
            "email": "ola@fjordware.no"
        }));
        let mut record = PersonRecord::from_profile(&first).unwrap();
        assert_eq!(record.email.as_deref(), Some("ola@fjordware.no"));

        let second = profile(serde_json::json!({
            "profileUrl": "https://linkedin.com/in/ola",
            "fullName": "Ola Nordmann",
            "email": "",
            "title": "Head of Sales"
        }));
        let changed = record.merge(&second);
        assert!(changed);
        assert_eq!(record.email.as_deref(), Some("ola@fjordware.no"));
        assert_eq!(record.title.as_deref(), Some("Head of Sales"));
    }

    #[test]
    fn test_nonblank_fills_blank() {
        let first = profile(serde_json::json!({
            "profileUrl": "https://linkedin.com/in/ola",
            "fullName": "Ola Nordmann"
        }));
        let mut record = PersonRecord::from_profile(&first).unwrap();
        assert!(record.email.is_none());

        let second = profile(serde_json::json!({
            "profileUrl": "https://linkedin.com/in/ola",
            "email": "ola@fjordware.no"
        }));
        assert!(record.merge(&second));
        assert_eq!(record.email.as_deref(), Some("ola@fjordware.no"));
    }

    #[test]
    fn test_identical_merge_reports_unchanged() {
        let data = profile(serde_json::json!({
            "profileUrl": "https://linkedin.com/in/ola",
            "fullName": "Ola Nordmann"
        }));
        let mut record = PersonRecord::from_profile(&data).unwrap();
        assert!(!record.merge(&data));
    }

    #[test]
    fn test_upsert_counts_total() {
        let counts = UpsertCounts {
            inserted: 3,
            updated: 2,
            skipped: 1,
        };
        assert_eq!(counts.total(), 6);
    }
}
