//! FERPA-aware anonymization pipeline. Student-identifying fields are
//! replaced with a deterministic pseudonym derived from the real Canvas ID,
//! so the same student always maps to the same pseudonym within a process
//! lifetime, but the mapping can't be reversed without the cache.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

const ESSENTIAL_USER_FIELDS: &[&str] = &["id", "enrollments", "role", "created_at", "updated_at"];
const REDACTED_STRING_MIN_LEN: usize = 50;

#[allow(clippy::unwrap_used)] // literal patterns, known valid at compile time
static EMAIL_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});
#[allow(clippy::unwrap_used)]
static PHONE_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap());
#[allow(clippy::unwrap_used)]
static SSN_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

/// Holds the real-id -> pseudonym cache. Explicitly owned (no process-global
/// state), constructed once per server instance.
pub struct Anonymizer {
    cache: Mutex<HashMap<String, String>>,
    debug: bool,
}

impl Default for Anonymizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Anonymizer {
    pub fn new() -> Self {
        Anonymizer {
            cache: Mutex::new(HashMap::new()),
            debug: false,
        }
    }

    /// Same as `new`, but when `debug` is set each freshly generated
    /// pseudonym is narrated on the `tracing` stream (never the real ID
    /// alone - only the `(real_id, pseudonym)` pair an operator already
    /// has Canvas-side access to) and the cache size is logged periodically.
    pub fn with_debug(debug: bool) -> Self {
        Anonymizer {
            cache: Mutex::new(HashMap::new()),
            debug,
        }
    }

    /// Number of distinct real IDs pseudonymized so far, for debug/stats use.
    #[allow(clippy::unwrap_used)]
    pub fn mapping_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Deterministic pseudonym for `real_id`, e.g. `Student_3f2b9a11`. Stable
    /// for the lifetime of this `Anonymizer` instance; does not persist
    /// across restarts (a fresh process derives fresh-looking but still
    /// deterministic pseudonyms from the same hash).
    #[allow(clippy::unwrap_used)]
    pub fn generate_anonymous_id(&self, real_id: &str, prefix: &str) -> String {
        let mut cache = self.cache.lock().unwrap();
        if let Some(existing) = cache.get(real_id) {
            return existing.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(real_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        let anon_id = format!("{prefix}_{}", &digest[..8]);
        cache.insert(real_id.to_string(), anon_id.clone());
        if self.debug {
            tracing::debug!(real_id, anon_id, mappings = cache.len(), "generated new pseudonym");
        }
        anon_id
    }

    /// Top-level dispatcher: picks the shape-specific anonymizer based on
    /// `data_type` or, failing that, on which fields are present.
    pub fn anonymize_response_data(&self, data: &Value, data_type: &str) -> Value {
        match data {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.anonymize_response_data(item, data_type))
                    .collect(),
            ),
            Value::Object(obj) => {
                let looks_like_user =
                    data_type == "users" || (obj.contains_key("name") && obj.contains_key("email"));
                let looks_like_discussion = data_type == "discussions" || obj.contains_key("message");
                let looks_like_submission =
                    data_type == "submissions" || obj.contains_key("submitted_at");
                let looks_like_assignment = data_type == "assignments" || obj.contains_key("due_at");

                if looks_like_user {
                    self.anonymize_user_data(data)
                } else if looks_like_discussion {
                    self.anonymize_discussion_entry(data)
                } else if looks_like_submission {
                    self.anonymize_submission_data(data)
                } else if looks_like_assignment {
                    self.anonymize_assignment_data(data)
                } else {
                    self.anonymize_generic(data)
                }
            }
            other => other.clone(),
        }
    }

    /// Generic recursive fallback: substitutes identifying keys
    /// (`name`/`email`/`login_id`/`sis_user_id`, case-insensitively) with the
    /// pseudonym for this object's `id` if present, else `[REDACTED]`, and
    /// recurses into every other value.
    fn anonymize_generic(&self, data: &Value) -> Value {
        match data {
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.anonymize_generic(item)).collect())
            }
            Value::Object(obj) => {
                let anon_id = obj.get("id").map(|id| self.generate_anonymous_id(&stringify(id), "Student"));
                let mut result = serde_json::Map::new();
                for (key, value) in obj {
                    let lower = key.to_lowercase();
                    if matches!(lower.as_str(), "name" | "email" | "login_id" | "sis_user_id") {
                        let replacement = anon_id.clone().unwrap_or_else(|| "[REDACTED]".to_string());
                        result.insert(key.clone(), Value::String(replacement));
                    } else {
                        result.insert(key.clone(), self.anonymize_generic(value));
                    }
                }
                Value::Object(result)
            }
            other => other.clone(),
        }
    }

    /// Full user-record anonymization: replaces every name-like and
    /// contact-like field, nulls optional PII fields, and redacts any other
    /// long (>50 char) string field that isn't in the essential allowlist.
    pub fn anonymize_user_data(&self, data: &Value) -> Value {
        let Value::Object(obj) = data else {
            return data.clone();
        };
        let mut result = obj.clone();

        let Some(id) = obj.get("id") else {
            return Value::Object(result);
        };
        let anon_id = self.generate_anonymous_id(&stringify(id), "Student");

        for field in ["name", "display_name", "short_name", "sortable_name"] {
            result.insert(field.to_string(), Value::String(anon_id.clone()));
        }
        result.insert(
            "email".to_string(),
            Value::String(format!("{}@example.edu", anon_id.to_lowercase())),
        );
        result.insert("login_id".to_string(), Value::String(anon_id.to_lowercase()));
        for field in ["sis_user_id", "integration_id", "avatar_url", "bio", "time_zone", "locale"] {
            result.insert(field.to_string(), Value::Null);
        }

        let handled: &[&str] = &[
            "name",
            "display_name",
            "short_name",
            "sortable_name",
            "email",
            "login_id",
            "sis_user_id",
            "integration_id",
            "avatar_url",
            "bio",
            "time_zone",
            "locale",
        ];
        for (key, value) in obj.iter() {
            if handled.contains(&key.as_str()) || ESSENTIAL_USER_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Value::String(s) = value {
                if s.len() > REDACTED_STRING_MIN_LEN {
                    result.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                }
            }
        }

        Value::Object(result)
    }

    /// Discussion entries: anonymizes the author/editor, scrubs free-text
    /// `message` bodies for embedded emails/phone numbers/SSNs, and recurses
    /// into `recent_replies`.
    pub fn anonymize_discussion_entry(&self, data: &Value) -> Value {
        let Value::Object(obj) = data else {
            return data.clone();
        };
        let mut result = obj.clone();

        if let Some(user_id) = obj.get("user_id") {
            let anon_id = self.generate_anonymous_id(&stringify(user_id), "Student");
            result.insert("user_name".to_string(), Value::String(anon_id.clone()));
            result.insert("display_name".to_string(), Value::String(anon_id));
        }

        for field in ["author", "editor"] {
            if let Some(value) = obj.get(field) {
                let anonymized = match value {
                    Value::Object(_) => self.anonymize_user_data(value),
                    Value::Null => Value::Null,
                    _ => {
                        let anon_id = self.generate_anonymous_id(&stringify(value), "Student");
                        Value::String(anon_id)
                    }
                };
                result.insert(field.to_string(), anonymized);
            }
        }

        if let Some(Value::String(message)) = obj.get("message") {
            result.insert("message".to_string(), Value::String(scrub_pii(message)));
        }

        if let Some(Value::Array(replies)) = obj.get("recent_replies") {
            let anonymized: Vec<Value> = replies
                .iter()
                .map(|reply| self.anonymize_discussion_entry(reply))
                .collect();
            result.insert("recent_replies".to_string(), Value::Array(anonymized));
        }

        Value::Object(result)
    }

    /// Submissions: anonymizes the nested `user` and redacts free-form
    /// `body`/`url`/`attachments` content, since submissions are the most
    /// likely place for raw student work product to leak.
    pub fn anonymize_submission_data(&self, data: &Value) -> Value {
        let Value::Object(obj) = data else {
            return data.clone();
        };
        let mut result = obj.clone();

        let anon_id = obj.get("user_id").map(|id| {
            let anon_id = self.generate_anonymous_id(&stringify(id), "Student");
            if let Some(user) = obj.get("user") {
                result.insert("user".to_string(), self.anonymize_user_data(user));
            }
            anon_id
        });

        for field in ["body", "url", "attachments"] {
            if let Some(value) = obj.get(field) {
                let replacement = match value {
                    Value::String(_) => match &anon_id {
                        Some(anon_id) => Value::String(format!("[CONTENT_REDACTED_FOR_{anon_id}]")),
                        None => Value::String("[CONTENT_REDACTED]".to_string()),
                    },
                    Value::Null => Value::Null,
                    _ => Value::String("[CONTENT_REDACTED]".to_string()),
                };
                result.insert(field.to_string(), replacement);
            }
        }

        Value::Object(result)
    }

    /// Assignments carry little PII; only an overlong `description` is
    /// truncated to avoid leaking embedded student-specific instructions.
    pub fn anonymize_assignment_data(&self, data: &Value) -> Value {
        let Value::Object(obj) = data else {
            return data.clone();
        };
        let mut result = obj.clone();
        if let Some(Value::String(description)) = obj.get("description") {
            if description.len() > 1000 {
                result.insert(
                    "description".to_string(),
                    Value::String("[LONG_DESCRIPTION_REDACTED_FOR_PRIVACY]".to_string()),
                );
            }
        }
        Value::Object(result)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scrub_pii(text: &str) -> String {
    let text = EMAIL_RE.replace_all(text, "[EMAIL_REDACTED]");
    let text = PHONE_RE.replace_all(&text, "[PHONE_REDACTED]");
    let text = SSN_RE.replace_all(&text, "[SSN_REDACTED]");
    text.into_owned()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn pseudonym_is_stable_for_the_same_id() {
        let anonymizer = Anonymizer::new();
        let first = anonymizer.generate_anonymous_id("12345", "Student");
        let second = anonymizer.generate_anonymous_id("12345", "Student");
        assert_eq!(first, second);
        assert!(first.starts_with("Student_"));
        assert_eq!(first.len(), "Student_".len() + 8);
    }

    #[test]
    fn pseudonym_differs_across_ids() {
        let anonymizer = Anonymizer::new();
        let a = anonymizer.generate_anonymous_id("1", "Student");
        let b = anonymizer.generate_anonymous_id("2", "Student");
        assert_ne!(a, b);
    }

    #[test]
    fn user_data_replaces_names_and_nulls_optional_pii() {
        let anonymizer = Anonymizer::new();
        let user = json!({
            "id": 42,
            "name": "Jane Student",
            "email": "jane@illinois.edu",
            "sis_user_id": "js123",
            "avatar_url": "https://example.com/a.png",
            "enrollments": ["enrollment-1"],
        });
        let result = anonymizer.anonymize_user_data(&user);
        let anon_id = result["name"].as_str().unwrap().to_string();
        assert!(anon_id.starts_with("Student_"));
        assert_eq!(result["email"], format!("{}@example.edu", anon_id.to_lowercase()));
        assert_eq!(result["sis_user_id"], Value::Null);
        assert_eq!(result["enrollments"], json!(["enrollment-1"]));
    }

    #[test]
    fn user_data_redacts_long_unrelated_strings_only() {
        let anonymizer = Anonymizer::new();
        let long_bio_field = "x".repeat(60);
        let user = json!({
            "id": 1,
            "name": "A",
            "notes": long_bio_field,
            "short_note": "ok",
        });
        let result = anonymizer.anonymize_user_data(&user);
        assert_eq!(result["notes"], "[REDACTED]");
        assert_eq!(result["short_note"], "ok");
    }

    #[test]
    fn discussion_entry_scrubs_embedded_pii_in_message() {
        let anonymizer = Anonymizer::new();
        let entry = json!({
            "user_id": 7,
            "message": "reach me at jane.doe@illinois.edu or 217-555-0100",
        });
        let result = anonymizer.anonymize_discussion_entry(&entry);
        let message = result["message"].as_str().unwrap();
        assert!(message.contains("[EMAIL_REDACTED]"));
        assert!(message.contains("[PHONE_REDACTED]"));
    }

    #[test]
    fn submission_data_redacts_body_with_anon_id_suffix() {
        let anonymizer = Anonymizer::new();
        let submission = json!({
            "user_id": 9,
            "body": "my essay text",
        });
        let result = anonymizer.anonymize_submission_data(&submission);
        let body = result["body"].as_str().unwrap();
        assert!(body.starts_with("[CONTENT_REDACTED_FOR_Student_"));
    }

    #[test]
    fn assignment_data_truncates_only_long_descriptions() {
        let anonymizer = Anonymizer::new();
        let short = json!({"description": "short description"});
        assert_eq!(
            anonymizer.anonymize_assignment_data(&short)["description"],
            "short description"
        );

        let long = json!({"description": "x".repeat(1001)});
        assert_eq!(
            anonymizer.anonymize_assignment_data(&long)["description"],
            "[LONG_DESCRIPTION_REDACTED_FOR_PRIVACY]"
        );
    }

    #[test]
    fn generic_dispatch_picks_submission_shape_from_fields() {
        let anonymizer = Anonymizer::new();
        let data = json!({"user_id": 3, "submitted_at": "2024-01-01", "body": "text"});
        let result = anonymizer.anonymize_response_data(&data, "general");
        assert!(result["body"].as_str().unwrap().starts_with("[CONTENT_REDACTED_FOR_"));
    }
}
