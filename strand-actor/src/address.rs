//! Hierarchical actor addresses

use crate::error::{ActorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A normalized, slash separated actor address such as `shop/cart/42`
///
/// Ordering is lexicographic over segments, so `a/b` sorts before `a/b/c`
/// and before `a/c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    segments: Vec<String>,
}

impl Address {
    /// Parse and normalize a path
    ///
    /// Leading and trailing slashes are ignored. Empty paths and empty
    /// interior segments (`a//b`) are rejected.
    pub fn create(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ActorError::InvalidAddress(path.to_string()));
        }

        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty() || s.trim() != s) {
            return Err(ActorError::InvalidAddress(path.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Address of a child actor one level below this one
    pub fn child(&self, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(ActorError::InvalidAddress(format!("{}/{}", self, name)));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for Address {
    type Err = ActorError;

    fn from_str(s: &str) -> Result<Self> {
        Address::create(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalization() {
        let a = Address::create("/shop/cart/").unwrap();
        let b = Address::create("shop/cart").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "shop/cart");
        assert_eq!(a.len(), 2);
        assert_eq!(a.name(), "cart");
    }

    #[test]
    fn test_rejects_bad_paths() {
        for path in ["", "/", "//", "a//b", "a/ /b"] {
            assert!(
                matches!(Address::create(path), Err(ActorError::InvalidAddress(_))),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_ordering_is_by_segment() {
        let mut addresses: Vec<Address> = ["a/c", "a/b/c", "a/b", "a-b"]
            .iter()
            .map(|p| Address::create(p).unwrap())
            .collect();
        addresses.sort();
        let rendered: Vec<String> = addresses.iter().map(Address::to_string).collect();
        // Segment-wise: "a" < "a-b", and within "a", "b" < "b/c" < "c"
        assert_eq!(rendered, vec!["a/b", "a/b/c", "a/c", "a-b"]);
    }

    #[test]
    fn test_child_and_parent() {
        let root = Address::create("shop").unwrap();
        let cart = root.child("cart").unwrap();
        assert_eq!(cart.to_string(), "shop/cart");
        assert_eq!(cart.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
        assert!(root.child("a/b").is_err());
        assert!(root.child("").is_err());
    }

    proptest! {
        #[test]
        fn edge_slashes_never_change_the_address(
            segments in prop::collection::vec("[a-z0-9_-]{1,8}", 1..6),
            leading in 0usize..3,
            trailing in 0usize..3,
        ) {
            let joined = segments.join("/");
            let padded = format!("{}{}{}", "/".repeat(leading), joined, "/".repeat(trailing));
            let address = Address::create(&padded).unwrap();
            prop_assert_eq!(address.segments(), segments.as_slice());
            prop_assert_eq!(address.to_string(), joined);
        }
    }
}
