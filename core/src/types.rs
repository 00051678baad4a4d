//! Domain DTOs exchanged with the CRM backend.
//!
//! # Design
//! Response types are defined independently from the mock-server crate; the
//! integration tests catch schema drift. Backend ids may arrive as JSON
//! strings or numbers and are normalised to `String` on the way in.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Render a JSON id (string or number) as a `String`.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_string(&value).ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => id_string(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("id must be a string or number")),
    }
}

fn de_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    values
        .iter()
        .map(|v| id_string(v).ok_or_else(|| serde::de::Error::custom("id must be a string or number")))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Website {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A contact as returned by the backend. Fields the client does not model
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Contact {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Values sent when creating or updating a contact.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ContactInput {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContactInput {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Binding of a contact to a website with consent and lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebsiteUser {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub website_id: String,
    #[serde(deserialize_with = "de_id")]
    pub contact_id: String,
    pub email: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub dedup_key: Option<String>,
    #[serde(default)]
    pub ppg_accepted: bool,
    #[serde(default)]
    pub ppg_updated_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Campaign {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub mailjet_id: i64,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub website_id: Option<String>,
    #[serde(default, deserialize_with = "de_ids")]
    pub target_lists_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TargetList {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub mailjet_id: i64,
}

/// Privacy-policy consent recorded for a site user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Consent {
    #[serde(default, alias = "isAccepted")]
    pub is_accepted: bool,
    /// Epoch seconds of the last consent change.
    #[serde(default, alias = "ppgUpdated")]
    pub ppg_updated: Option<i64>,
}

/// Consents keyed by user email.
pub type Consents = HashMap<String, Consent>;

/// Value held by a site field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    /// Ids of the entities the field references.
    ReferenceList(Vec<String>),
}

/// A labelled field attached to a site user. Fields without a value are
/// skipped when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Field {
    pub label: String,
    #[serde(default)]
    pub value: Option<FieldValue>,
}

impl Field {
    pub fn scalar(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: Some(FieldValue::Scalar(value.into())),
        }
    }

    pub fn references<I, S>(label: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            value: Some(FieldValue::ReferenceList(
                ids.into_iter().map(Into::into).collect(),
            )),
        }
    }
}

/// Named values of a webform submission, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionValues(Vec<(String, Option<String>)>);

impl SubmissionValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, replacing an earlier entry with the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, Some(value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for SubmissionValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, Option<V>)>>(iter: T) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.insert(k, v.map(Into::into));
        }
        values
    }
}

// Submissions arrive as JSON objects or as lists of `[name, value]` pairs.
// Both forms are read entry by entry so document order survives.
impl<'de> Deserialize<'de> for SubmissionValues {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SubmissionValuesVisitor)
    }
}

struct SubmissionValuesVisitor;

fn submitted_scalar(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl<'de> Visitor<'de> for SubmissionValuesVisitor {
    type Value = SubmissionValues;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object of submission values or a list of [name, value] pairs")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut values = SubmissionValues::new();
        while let Some((name, value)) = map.next_entry::<String, Value>()? {
            values.insert(name, submitted_scalar(value));
        }
        Ok(values)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = SubmissionValues::new();
        while let Some((name, value)) = seq.next_element::<(String, Option<Value>)>()? {
            values.insert(name, value.and_then(submitted_scalar));
        }
        Ok(values)
    }
}
