use std::collections::BTreeSet;
use std::fmt;

/// Normalized OAuth scope set.
///
/// Scopes are lowercased and trimmed on insertion, so comparisons are
/// case-insensitive and order-insensitive. The sorted, space-joined form
/// produced by [`ScopeSet::as_target`] is the `target` string persisted on
/// access token records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: BTreeSet<String>,
}

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from individual scope values, dropping empties.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for part in parts {
            set.insert(part.as_ref());
        }
        set
    }

    /// Parse a space-separated scope string (the OAuth wire format).
    pub fn parse(raw: &str) -> Self {
        Self::from_parts(raw.split_ascii_whitespace())
    }

    pub fn insert(&mut self, scope: &str) {
        let normalized = scope.trim().to_lowercase();
        if !normalized.is_empty() {
            self.scopes.insert(normalized);
        }
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(&scope.trim().to_lowercase())
    }

    /// True when every scope in `other` is present in `self`.
    pub fn is_superset_of(&self, other: &ScopeSet) -> bool {
        self.scopes.is_superset(&other.scopes)
    }

    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet {
            scopes: self.scopes.union(&other.scopes).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    /// The persisted `target` form: sorted, lowercase, space-joined.
    pub fn as_target(&self) -> String {
        self.scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_target())
    }
}
