//! Core type definitions for EntiGraph.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name of a registered entity or embedded type.
///
/// Cheap to clone; compares and hashes as its string content.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeName(Arc<str>);

impl TypeName {
    /// Creates a type name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeName({})", self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&TypeName> for TypeName {
    fn from(name: &TypeName) -> Self {
        name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(TypeName::new("Account"), 1);
        assert_eq!(map.get("Account"), Some(&1));
        assert_eq!(map.get("Order"), None);
    }

    #[test]
    fn display_is_bare_name() {
        assert_eq!(TypeName::from("Order").to_string(), "Order");
        assert_eq!(format!("{:?}", TypeName::from("Order")), "TypeName(Order)");
    }
}
