//! User transformation.
//!
//! # Responsibilities
//! - Project [`User`] records into [`UserSummary`] values
//! - Filter by arbitrary predicate, email domain, or city
//!
//! # Design Decisions
//! - Stateless and infallible: empty input yields empty output
//! - Order of surviving elements is always preserved

use crate::model::{User, UserSummary};

/// Maps and filters fetched users into summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserTransformer;

impl UserTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Map every user 1:1 into a summary, preserving order.
    pub fn transform(&self, users: &[User]) -> Vec<UserSummary> {
        tracing::info!(count = users.len(), "Transforming users into summaries");
        let summaries: Vec<UserSummary> = users.iter().map(UserSummary::from).collect();
        tracing::debug!(count = summaries.len(), "Transformed users");
        summaries
    }

    /// Keep the users matching `predicate`, then map them.
    pub fn filter_and_transform<P>(&self, users: &[User], predicate: P) -> Vec<UserSummary>
    where
        P: Fn(&User) -> bool,
    {
        tracing::info!(count = users.len(), "Filtering and transforming users");
        let summaries: Vec<UserSummary> = users
            .iter()
            .filter(|user| predicate(user))
            .map(UserSummary::from)
            .collect();
        tracing::debug!(count = summaries.len(), "Filtered and transformed users");
        summaries
    }

    /// Keep users whose email ends with `@{domain}` (case-sensitive).
    ///
    /// Users without an email never match.
    pub fn filter_by_email_domain_and_transform(
        &self,
        users: &[User],
        domain: &str,
    ) -> Vec<UserSummary> {
        let suffix = format!("@{domain}");
        let summaries = self.filter_and_transform(users, |user| {
            user.email.as_deref().is_some_and(|email| email.ends_with(&suffix))
        });
        tracing::debug!(domain, count = summaries.len(), "Users matched email domain");
        summaries
    }

    /// Keep users whose address city equals `city`, ignoring case.
    ///
    /// Users without an address (or without a city) never match.
    pub fn filter_by_city_and_transform(&self, users: &[User], city: &str) -> Vec<UserSummary> {
        let wanted = city.to_lowercase();
        let summaries = self.filter_and_transform(users, |user| {
            user.city().is_some_and(|c| c.to_lowercase() == wanted)
        });
        tracing::debug!(city, count = summaries.len(), "Users matched city");
        summaries
    }
}
