//! Report metadata: a flat string map serialized as one JSON object.
//!
//! The well-known keys are stored in Spanish because they are part of the
//! on-disk format; renaming them would orphan every existing store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const KEY_REPORT: &str = "reporte";
pub const KEY_SYSTEM: &str = "sistema";
pub const KEY_APPLICATION: &str = "aplicacion";
pub const KEY_DEPARTMENT: &str = "departamento";
pub const KEY_DATE: &str = "fecha";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    attrs: BTreeMap<String, String>,
}

impl Metadata {
    /// Build the standard attribute set. The date defaults to today in
    /// `%Y%m%d`; use [`Metadata::set`] to override it or to attach extra
    /// attributes.
    pub fn new(report: &str, system: &str, application: &str, department: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(KEY_REPORT.to_owned(), report.to_owned());
        attrs.insert(KEY_SYSTEM.to_owned(), system.to_owned());
        attrs.insert(KEY_APPLICATION.to_owned(), application.to_owned());
        attrs.insert(KEY_DEPARTMENT.to_owned(), department.to_owned());
        attrs.insert(
            KEY_DATE.to_owned(),
            chrono::Local::now().format("%Y%m%d").to_string(),
        );
        Metadata { attrs }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_owned(), value.to_owned());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn report(&self) -> &str {
        self.get(KEY_REPORT).unwrap_or("")
    }

    pub fn system(&self) -> &str {
        self.get(KEY_SYSTEM).unwrap_or("")
    }

    pub fn application(&self) -> &str {
        self.get(KEY_APPLICATION).unwrap_or("")
    }

    pub fn department(&self) -> &str {
        self.get(KEY_DEPARTMENT).unwrap_or("")
    }

    pub fn date(&self) -> &str {
        self.get(KEY_DATE).unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn dump(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn load(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
