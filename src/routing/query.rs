//! Query string and pathname decoding.

use std::borrow::Cow;
use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde::Serialize;
use url::Url;

/// A decoded query parameter: one value, or every value in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Many(Vec<String>),
}

impl QueryValue {
    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(first) => {
                let first = std::mem::take(first);
                *self = QueryValue::Many(vec![first, value]);
            }
            QueryValue::Many(values) => values.push(value),
        }
    }

    /// First value received for the key.
    pub fn first(&self) -> &str {
        match self {
            QueryValue::Single(value) => value,
            QueryValue::Many(values) => values.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(value) => vec![value.as_str()],
            QueryValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Decoded query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<String, QueryValue>);

impl Query {
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).map(QueryValue::first)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Decode a raw query string. Repeated keys collect into `QueryValue::Many`.
pub fn decode_query(raw: Option<&str>) -> Query {
    let mut params: BTreeMap<String, QueryValue> = BTreeMap::new();
    let Some(raw) = raw else {
        return Query(params);
    };

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = value.into_owned();
        match params.get_mut(&*key) {
            Some(existing) => existing.push(value),
            None => {
                params.insert(key.into_owned(), QueryValue::Single(value));
            }
        }
    }

    Query(params)
}

/// Percent-decoded path of `url`. Keeps the raw path if decoding yields invalid UTF-8.
pub fn decode_pathname(url: &Url) -> String {
    let raw = url.path();
    match percent_decode_str(raw).decode_utf8() {
        Ok(Cow::Borrowed(path)) => path.to_string(),
        Ok(Cow::Owned(path)) => path,
        Err(_) => raw.to_string(),
    }
}
