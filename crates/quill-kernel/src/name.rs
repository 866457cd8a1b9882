//! Hierarchical names
//!
//! Names like `Nat.add` or `foo._spec.1.2` are sequences of string and
//! numeric components. Auxiliary machinery (the unique-name generator,
//! macro hygiene) leans on numeric components, so they are first-class
//! rather than an encoding trick.
//!
//! # Hash caching
//!
//! The hash is computed once at construction and cached. Environments
//! hold many constants and name lookups dominate, so `Hash` must not
//! re-traverse the component list on every probe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Reserved first component of names private to a scope.
const PRIVATE_HEADER: &str = "_private";

/// One component of a hierarchical name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NameComponent {
    /// String component, as in `Nat` or `add`
    Str(Arc<str>),
    /// Numeric component, used by generated auxiliary names
    Num(u64),
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameComponent::Str(s) => write!(f, "{s}"),
            NameComponent::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Hierarchical name with a creation-time cached hash.
///
/// The anonymous name is the empty component sequence.
#[derive(Clone, Debug)]
pub struct Name {
    parts: Vec<NameComponent>,
    cached_hash: u64,
}

impl Name {
    fn from_parts(parts: Vec<NameComponent>) -> Self {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        parts.hash(&mut hasher);
        let cached_hash = hasher.finish();
        Name { parts, cached_hash }
    }

    /// The anonymous (root) name.
    pub fn anon() -> Self {
        Self::from_parts(Vec::new())
    }

    /// Append a string component.
    #[must_use]
    pub fn str(self, s: impl AsRef<str>) -> Self {
        let mut parts = self.parts;
        parts.push(NameComponent::Str(Arc::from(s.as_ref())));
        Self::from_parts(parts)
    }

    /// Append a numeric component.
    #[must_use]
    pub fn num(self, n: u64) -> Self {
        let mut parts = self.parts;
        parts.push(NameComponent::Num(n));
        Self::from_parts(parts)
    }

    /// Append every component of `other`.
    #[must_use]
    pub fn append(self, other: &Name) -> Self {
        let mut parts = self.parts;
        parts.extend(other.parts.iter().cloned());
        Self::from_parts(parts)
    }

    pub fn is_anon(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn components(&self) -> &[NameComponent] {
        &self.parts
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether `self` is a (non-strict) component prefix of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.parts.len() >= self.parts.len() && other.parts[..self.parts.len()] == self.parts[..]
    }

    /// Privatize under `scope`: `foo.bar` becomes `_private.<scope>.0.foo.bar`.
    ///
    /// The trailing `0` separates the scope components from the payload so
    /// the public form can be recovered unambiguously.
    #[must_use]
    pub fn privatized(&self, scope: &Name) -> Name {
        Name::anon()
            .str(PRIVATE_HEADER)
            .append(scope)
            .num(0)
            .append(self)
    }

    /// Whether this name lives in some private namespace.
    pub fn is_private(&self) -> bool {
        matches!(self.parts.first(), Some(NameComponent::Str(s)) if &**s == PRIVATE_HEADER)
    }

    /// Recover the public form of a privatized name, if it is one.
    pub fn deprivatized(&self) -> Option<Name> {
        if !self.is_private() {
            return None;
        }
        let sep = self
            .parts
            .iter()
            .position(|c| matches!(c, NameComponent::Num(0)))?;
        Some(Self::from_parts(self.parts[sep + 1..].to_vec()))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        // Hash mismatch settles it without touching the components.
        self.cached_hash == other.cached_hash && self.parts == other.parts
    }
}

impl Eq for Name {}

impl Hash for Name {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cached_hash.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.parts.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let parts = Vec::<NameComponent>::deserialize(deserializer)?;
        Ok(Self::from_parts(parts))
    }
}

impl FromStr for Name {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Name::anon());
        }
        Ok(s.split('.').fold(Name::anon(), |acc, part| {
            if let Ok(n) = part.parse::<u64>() {
                acc.num(n)
            } else {
                acc.str(part)
            }
        }))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        s.parse().expect("Name::from_str is infallible")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "[anonymous]");
        }
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}
