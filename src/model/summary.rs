//! Simplified user representation sent with `POST /posts`.

use serde::{Deserialize, Serialize};

use crate::model::User;

/// Projection of a [`User`].
///
/// `location` and `organization` are never absent: they are the empty string
/// when the user has no address (or city) or no company (or company name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserSummary {
    pub user_id: i64,
    pub full_name: Option<String>,
    pub contact_email: Option<String>,
    pub location: String,
    pub organization: String,
}

impl UserSummary {
    /// Build a summary with empty location and organization.
    pub fn new(
        user_id: i64,
        full_name: impl Into<String>,
        contact_email: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            full_name: Some(full_name.into()),
            contact_email: Some(contact_email.into()),
            location: String::new(),
            organization: String::new(),
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            full_name: user.name.clone(),
            contact_email: user.email.clone(),
            location: user.city().unwrap_or_default().to_string(),
            organization: user.company_name().unwrap_or_default().to_string(),
        }
    }
}
