//! Cache key construction.
//!
//! Keys have the shape `{namespace}:{entity}[:{id}[:{sub}]][?{params}]`.
//!
//! - `namespace` and `entity` are plain identifiers (no `:`, `?`, `#` or
//!   whitespace).
//! - `id` and `sub` are percent-encoded, so identifiers containing
//!   separators cannot collide with key structure.
//! - `params` is a flat map rendered as compact JSON from an ordered map,
//!   so insertion order never changes the key. An empty map renders
//!   nothing, exactly like an absent one.
//!
//! ```rust
//! # use hoard::{CacheKey, QueryParams, ParamValue};
//! let a = QueryParams::new().with("page", 2).with("limit", 10).with("search", ParamValue::Null);
//! let b = QueryParams::new().with("search", ParamValue::Null).with("limit", 10).with("page", 2);
//!
//! let ka = CacheKey::builder("list", "b2b_users").params(a).build().unwrap();
//! let kb = CacheKey::builder("list", "b2b_users").params(b).build().unwrap();
//! assert_eq!(ka, kb);
//! assert_eq!(ka.as_str(), r#"list:b2b_users?{"limit":10,"page":2,"search":null}"#);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{HoardError, Result};

/// Suffix appended to a key to form its refresh-lease marker.
const LEASE_SUFFIX: &str = "#refresh";

/// A primitive query-parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// Flat map of query parameters, always iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Canonical rendering used as the key suffix.
    ///
    /// Non-finite floats are rejected: JSON would render them as `null`
    /// and collide with an explicit null.
    fn canonical(&self) -> Result<String> {
        if let Some((name, _)) = self
            .0
            .iter()
            .find(|(_, v)| matches!(v, ParamValue::Float(f) if !f.is_finite()))
        {
            return Err(HoardError::InvalidKey(format!(
                "parameter '{name}' is not a finite number"
            )));
        }
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A validated cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    tag_len: usize,
    namespace_len: usize,
}

impl CacheKey {
    /// Start building a key for `namespace` and `entity`.
    pub fn builder(namespace: impl Into<String>, entity: impl Into<String>) -> KeyBuilder {
        KeyBuilder::new(namespace, entity)
    }

    /// Accept a fully-qualified key string, e.g. for narrow invalidation.
    ///
    /// The string must start with a valid `{namespace}:{entity}` pair.
    pub fn from_raw(raw: impl Into<String>) -> Result<Self> {
        let key = raw.into();
        let head = key.split('?').next().unwrap_or_default();
        let mut parts = head.splitn(3, ':');
        let namespace = parts.next().unwrap_or_default();
        let entity = parts.next().ok_or_else(|| {
            HoardError::InvalidKey(format!("'{key}' has no entity segment"))
        })?;
        validate_segment("namespace", namespace)?;
        validate_segment("entity", entity)?;
        let namespace_len = namespace.len();
        let tag_len = namespace_len + 1 + entity.len();
        Ok(Self {
            key,
            tag_len,
            namespace_len,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn namespace(&self) -> &str {
        &self.key[..self.namespace_len]
    }

    pub fn entity(&self) -> &str {
        &self.key[self.namespace_len + 1..self.tag_len]
    }

    /// `{namespace}:{entity}`: the registry bucket this key is filed under.
    pub fn tag(&self) -> &str {
        &self.key[..self.tag_len]
    }

    /// Marker key used as the advisory refresh lease for this key.
    pub fn lease_key(&self) -> String {
        format!("{}{LEASE_SUFFIX}", self.key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Fluent builder for [`CacheKey`].
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
    entity: String,
    id: Option<String>,
    sub: Option<String>,
    params: Option<QueryParams>,
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity: entity.into(),
            id: None,
            sub: None,
            params: None,
        }
    }

    /// Entity identifier. Absent means a collection-level key.
    pub fn id(mut self, id: impl fmt::Display) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Sub-resource suffix such as `"profile"`. Requires an id.
    pub fn sub(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Replace the query parameters.
    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Add a single query parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params
            .get_or_insert_with(QueryParams::new)
            .insert(name, value);
        self
    }

    pub fn build(self) -> Result<CacheKey> {
        validate_segment("namespace", &self.namespace)?;
        validate_segment("entity", &self.entity)?;

        let namespace_len = self.namespace.len();
        let mut key = format!("{}:{}", self.namespace, self.entity);
        let tag_len = key.len();

        match (&self.id, &self.sub) {
            (Some(id), sub) => {
                key.push(':');
                key.push_str(&urlencoding::encode(id));
                if let Some(sub) = sub {
                    if sub.is_empty() {
                        return Err(HoardError::InvalidKey("empty sub-resource".into()));
                    }
                    key.push(':');
                    key.push_str(&urlencoding::encode(sub));
                }
            }
            (None, Some(sub)) => {
                return Err(HoardError::InvalidKey(format!(
                    "sub-resource '{sub}' requires an id"
                )));
            }
            (None, None) => {}
        }

        if let Some(params) = self.params.as_ref().filter(|p| !p.is_empty()) {
            key.push('?');
            key.push_str(&params.canonical()?);
        }

        Ok(CacheKey {
            key,
            tag_len,
            namespace_len,
        })
    }
}

/// Build a key from its logical parts.
///
/// Equivalent to the [`KeyBuilder`] chain; `None` for `params` and an
/// empty map yield the same key.
pub fn build_key(
    namespace: &str,
    entity: &str,
    id: Option<&str>,
    params: Option<&QueryParams>,
) -> Result<CacheKey> {
    let mut builder = KeyBuilder::new(namespace, entity);
    if let Some(id) = id {
        builder = builder.id(id);
    }
    if let Some(params) = params {
        builder = builder.params(params.clone());
    }
    builder.build()
}

/// Split a `{namespace}:{entity}` tag into its validated parts.
pub fn split_tag(tag: &str) -> Result<(&str, &str)> {
    let (namespace, entity) = tag.split_once(':').ok_or_else(|| {
        HoardError::InvalidKey(format!("tag '{tag}' must be '{{namespace}}:{{entity}}'"))
    })?;
    validate_segment("namespace", namespace)?;
    validate_segment("entity", entity)?;
    Ok((namespace, entity))
}

/// The `{namespace}:{entity}` prefix of a fully-qualified key string.
pub(crate) fn tag_of(key: &str) -> Option<&str> {
    let head = key.split('?').next()?;
    let ns_end = head.find(':')?;
    let end = head[ns_end + 1..]
        .find(':')
        .map_or(head.len(), |i| ns_end + 1 + i);
    Some(&key[..end])
}

fn validate_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(HoardError::InvalidKey(format!("{what} must not be empty")));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| matches!(c, ':' | '?' | '#') || c.is_whitespace())
    {
        return Err(HoardError::InvalidKey(format!(
            "{what} '{segment}' contains reserved character {c:?}"
        )));
    }
    Ok(())
}
