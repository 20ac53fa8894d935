use serde::{Deserialize, Serialize};

/// Structured fields pulled out of one conversation record. Built once by the
/// extraction boundary and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContact {
    pub name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub free_text: String,
}

impl ExtractedContact {
    pub fn trimmed_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|name| !name.is_empty())
    }

    /// Splits the extracted name into (first, last) search tokens. A single
    /// token is treated as a surname, which is the stronger CRM search key.
    pub fn split_name(&self) -> (Option<String>, Option<String>) {
        let Some(name) = self.trimmed_name() else {
            return (None, None);
        };
        let mut tokens = name.split_whitespace();
        let head = tokens.next().map(str::to_string);
        let rest: Vec<&str> = tokens.collect();
        if rest.is_empty() {
            (None, head)
        } else {
            (head, Some(rest.join(" ")))
        }
    }

    pub fn has_identity(&self) -> bool {
        self.trimmed_name().is_some()
            || self.phone.as_deref().map(str::trim).is_some_and(|phone| !phone.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::ExtractedContact;

    fn contact_named(name: &str) -> ExtractedContact {
        ExtractedContact { name: Some(name.to_string()), ..ExtractedContact::default() }
    }

    #[test]
    fn multi_token_name_splits_into_first_and_rest() {
        let (first, last) = contact_named("Maria de Souza Santos").split_name();
        assert_eq!(first.as_deref(), Some("Maria"));
        assert_eq!(last.as_deref(), Some("de Souza Santos"));
    }

    #[test]
    fn single_token_name_is_used_as_surname() {
        let (first, last) = contact_named("Santos").split_name();
        assert_eq!(first, None);
        assert_eq!(last.as_deref(), Some("Santos"));
    }

    #[test]
    fn blank_name_yields_no_tokens() {
        let (first, last) = contact_named("   ").split_name();
        assert_eq!(first, None);
        assert_eq!(last, None);
    }

    #[test]
    fn identity_requires_a_non_blank_name_or_phone() {
        assert!(!ExtractedContact::default().has_identity());
        assert!(contact_named("Maria").has_identity());

        let phone_only = ExtractedContact {
            phone: Some("65991234567".to_string()),
            ..ExtractedContact::default()
        };
        assert!(phone_only.has_identity());

        let blank_phone =
            ExtractedContact { phone: Some("  ".to_string()), ..ExtractedContact::default() };
        assert!(!blank_phone.has_identity());
    }
}
