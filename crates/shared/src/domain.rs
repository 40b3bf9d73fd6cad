use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Joins a group's display name and id in the wire form `Name::Id`.
pub const GROUP_REF_SEPARATOR: &str = "::";

// Servers hand ids out as either JSON strings or integers; both decode to the textual form.
macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(IdVisitor).map(Self)
            }
        }
    };
}

struct IdVisitor;

impl<'de> de::Visitor<'de> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or integer identifier")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
        Ok(value.to_string())
    }
}

id_newtype!(GroupId);
id_newtype!(QuestionId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupRefError {
    #[error("group reference {0:?} has no \"::\" separator")]
    MissingSeparator(String),
    #[error("group reference {0:?} has an empty group id")]
    EmptyId(String),
}

/// A group membership as carried on a user record: display name plus unique id.
///
/// Names are not unique and may themselves contain the separator only in
/// the sense that the wire form is split on the *first* `::`; everything
/// after it belongs to the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupRef {
    pub name: String,
    pub group_id: GroupId,
}

impl GroupRef {
    pub fn new(name: impl Into<String>, group_id: impl Into<GroupId>) -> Self {
        Self {
            name: name.into(),
            group_id: group_id.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, GroupRefError> {
        let (name, id) = raw
            .split_once(GROUP_REF_SEPARATOR)
            .ok_or_else(|| GroupRefError::MissingSeparator(raw.to_string()))?;
        if id.is_empty() {
            return Err(GroupRefError::EmptyId(raw.to_string()));
        }
        Ok(Self::new(name, id))
    }

    pub fn to_wire(&self) -> String {
        format!("{}{GROUP_REF_SEPARATOR}{}", self.name, self.group_id)
    }
}

impl FromStr for GroupRef {
    type Err = GroupRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for GroupRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for GroupRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub groups: Vec<GroupRef>,
}

impl User {
    pub fn display_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn group(&self, group_id: &GroupId) -> Option<&GroupRef> {
        self.groups.iter().find(|group| &group.group_id == group_id)
    }

    pub fn is_member(&self, group_id: &GroupId) -> bool {
        self.group(group_id).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: QuestionId,
    #[serde(default)]
    pub group_id: GroupId,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "question", default)]
    pub text: String,
    /// Set on locally synthesized questions awaiting the next group refresh.
    #[serde(skip)]
    pub provisional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    #[serde(default)]
    pub question_id: QuestionId,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "answer", default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}
