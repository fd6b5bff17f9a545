//! Fan: the buyer identity record, shared across workspaces.

use chrono::{DateTime, Utc};
use common::FanId;
use serde::{Deserialize, Serialize};

/// A customer identity, globally unique by email.
///
/// Created or matched when a charge succeeds, never at cart creation; a cart
/// may exist before any fan identity is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fan {
    pub id: FanId,
    pub email: String,
    pub display_name: String,
    /// Payment-provider customer id, when one exists.
    pub provider_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Fan {
    /// Creates a fan from a charge email, deriving a display name from the
    /// local part.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        let display_name = display_name_from_email(&email);
        Self {
            id: FanId::new(),
            email,
            display_name,
            provider_customer_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Normalizes a display name from an email local part: digits stripped,
/// separators collapsed to spaces, words capitalized.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let cleaned: String = local
        .chars()
        .map(|c| match c {
            '.' | '_' | '-' | '+' => ' ',
            c if c.is_ascii_digit() => ' ',
            c => c,
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_strips_digits_and_separators() {
        assert_eq!(display_name_from_email("jane.doe42@example.com"), "Jane Doe");
        assert_eq!(display_name_from_email("sam_w@example.com"), "Sam W");
        assert_eq!(display_name_from_email("mk+promo@example.com"), "Mk Promo");
    }

    #[test]
    fn all_digit_local_part_yields_empty_name() {
        assert_eq!(display_name_from_email("12345@example.com"), "");
    }

    #[test]
    fn from_email_fills_display_name() {
        let fan = Fan::from_email("jane.doe@example.com");
        assert_eq!(fan.display_name, "Jane Doe");
        assert!(fan.provider_customer_id.is_none());
    }
}
