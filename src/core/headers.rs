//! Case-insensitive, order-preserving HTTP header multimap.
//!
//! Unlike `http::HeaderMap`, this map preserves the original casing of header
//! names on storage, retrieval and iteration, while all lookups compare names
//! case-insensitively. Multiple values per name are kept in insertion order.
//! A lowercased side index keeps per-name lookups O(1) amortized.
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    value: String,
}

/// Ordered multimap of header name/value pairs with case-insensitive names.
///
/// Absent names are represented by empty results; no operation faults on a
/// missing key. No operation observably changes the case of a stored name.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<HeaderEntry>,
    // lowercased name -> positions into `entries`, kept in insertion order
    index: HashMap<String, Vec<usize>>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values stored under `name` (case-insensitive) with a
    /// single value. The newly stored entry keeps the caller's casing.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        if self.index.contains_key(&key) {
            self.entries
                .retain(|e| !e.name.eq_ignore_ascii_case(&name));
            self.rebuild_index();
        }
        self.push_entry(name, value.into());
    }

    /// Append a value without removing existing ones.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push_entry(name.into(), value.into());
    }

    /// Store the value only when no entry exists for the name.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains_name(&name) {
            self.push_entry(name, value.into());
        }
    }

    /// First value stored under `name`, if any.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.index
            .get(&name.to_ascii_lowercase())
            .and_then(|positions| positions.first())
            .map(|&i| self.entries[i].value.as_str())
    }

    /// All values stored under `name`, in insertion order. Empty when absent.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|positions| {
                positions
                    .iter()
                    .map(|&i| self.entries[i].value.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any value is stored under `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Exact-value membership test under a case-insensitive name.
    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.get_all(name).iter().any(|v| *v == value)
    }

    /// Append every entry of `other`, preserving its order.
    pub fn put_all(&mut self, other: &Headers) {
        for entry in &other.entries {
            self.push_entry(entry.name.clone(), entry.value.clone());
        }
    }

    /// Remove all values for `name`. Returns how many entries were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let key = name.to_ascii_lowercase();
        let Some(positions) = self.index.remove(&key) else {
            return 0;
        };
        let removed = positions.len();
        self.entries.retain(|e| !e.name.eq_ignore_ascii_case(name));
        self.rebuild_index();
        removed
    }

    /// Total number of stored entries (values, not distinct names).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries as (name, value) pairs in insertion order, with the
    /// originally stored name casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }

    fn push_entry(&mut self, name: String, value: String) {
        let key = name.to_ascii_lowercase();
        self.index.entry(key).or_default().push(self.entries.len());
        self.entries.push(HeaderEntry { name, value });
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.index
                .entry(entry.name.to_ascii_lowercase())
                .or_default()
                .push(i);
        }
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Headers {}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}
