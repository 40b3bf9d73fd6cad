//! Turns the raw user record into a canonical membership list.

use std::collections::HashSet;

use serde_json::Value;
use shared::{
    domain::{GroupRef, GroupRefError, User},
    protocol::UserRecord,
};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub user: User,
    /// Distinct group tokens that could not be decomposed into name and id.
    pub malformed: Vec<GroupRefError>,
}

/// Never fails: malformed or missing group lists resolve to no memberships.
pub fn resolve(requested_username: &str, record: UserRecord) -> Resolution {
    let mut groups = Vec::new();
    let mut malformed = Vec::new();

    for token in dedup_group_tokens(record.groups.as_ref()) {
        match GroupRef::parse(&token) {
            Ok(group) => groups.push(group),
            Err(err) => {
                warn!(username = requested_username, "membership: {err}");
                malformed.push(err);
            }
        }
    }

    let user = User {
        username: record
            .username
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| requested_username.to_string()),
        first_name: record.first_name.unwrap_or_default(),
        middle_name: record.middle_name.unwrap_or_default(),
        last_name: record.last_name.unwrap_or_default(),
        groups,
    };

    Resolution { user, malformed }
}

/// Distinct string entries of `groups`, in first-seen order.
pub fn dedup_group_tokens(groups: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(entries)) = groups else {
        if groups.is_some_and(|value| !value.is_null()) {
            warn!("membership: groups field is not a list; treating as empty");
        }
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut tokens = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::String(token) = entry else {
            warn!("membership: dropping non-string group entry {entry}");
            continue;
        };
        if seen.insert(token.as_str()) {
            tokens.push(token.clone());
        }
    }
    tokens
}

#[cfg(test)]
#[path = "tests/membership_tests.rs"]
mod tests;
