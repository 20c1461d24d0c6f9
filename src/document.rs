//! Documents
//!
//! A document is an ordered mapping from field name to value. The
//! mapping is open-ended at this level; validation against the
//! collection's declared fields happens at the write boundary.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::Value;

/// One record within a collection, identified by the collection's
/// primary-key value(s)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    values: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field value, replacing any previous one
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Builder-style `set`
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Extracts the primary-key values for the given key fields.
    /// Every key field must be present and non-null.
    pub(crate) fn primary_key(&self, key_fields: &[String]) -> Result<Vec<Value>> {
        let mut key = Vec::with_capacity(key_fields.len());
        for name in key_fields {
            match self.values.get(name) {
                Some(v) if !v.is_null() => key.push(v.clone()),
                _ => {
                    return Err(Error::type_mismatch(format!(
                        "primary key field {name:?} must be present and non-null"
                    )))
                }
            }
        }
        Ok(key)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let doc = Document::new().with("name", "Alice").with("age", 30i64);
        assert_eq!(doc.get("name"), Some(&Value::from("Alice")));
        assert_eq!(doc.get("age"), Some(&Value::Integer(30)));
        assert_eq!(doc.get("missing"), None);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_primary_key_extraction() {
        let doc = Document::new().with("a", "x").with("b", 2i64);
        let key = doc.primary_key(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(key, vec![Value::from("x"), Value::Integer(2)]);
    }

    #[test]
    fn test_primary_key_missing_or_null() {
        let doc = Document::new().with("a", "x");
        assert!(doc.primary_key(&["b".to_string()]).is_err());

        let mut doc = Document::new();
        doc.set("a", Value::Null);
        assert!(doc.primary_key(&["a".to_string()]).is_err());
    }
}
