//! Address patterns and route tables
//!
//! A pattern such as `shop/{cart}/items/{}` is a list of segments, each
//! either a literal or a parameter. Parameters match any one concrete
//! segment; named parameters are captured.

use crate::address::Address;
use crate::error::{ActorError, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    Literal(String),
    /// `{name}` captures the matched segment, `{}` discards it
    Param(Option<String>),
}

impl Segment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == segment,
            Segment::Param(_) => true,
        }
    }

    /// Comparison under which a parameter equals anything
    fn loose_cmp(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Literal(a), Segment::Literal(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(lit) => f.write_str(lit),
            Segment::Param(Some(name)) => write!(f, "{{{}}}", name),
            Segment::Param(None) => f.write_str("{}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ActorError::InvalidAddress(pattern.to_string()));
        }

        let mut segments = Vec::new();
        for raw in trimmed.split('/') {
            let segment = if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
                if inner.contains(['{', '}']) {
                    return Err(ActorError::InvalidAddress(pattern.to_string()));
                }
                Segment::Param((!inner.is_empty()).then(|| inner.to_string()))
            } else if raw.is_empty() || raw.contains(['{', '}']) {
                return Err(ActorError::InvalidAddress(pattern.to_string()));
            } else {
                Segment::Literal(raw.to_string())
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a concrete address, returning the captured parameters
    pub fn matches(&self, address: &Address) -> Option<BTreeMap<String, String>> {
        if self.segments.len() != address.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (pattern, segment) in self.segments.iter().zip(address.segments()) {
            if !pattern.matches(segment) {
                return None;
            }
            if let Segment::Param(Some(name)) = pattern {
                params.insert(name.clone(), segment.clone());
            }
        }
        Some(params)
    }

    /// True if some address matches both patterns
    pub fn overlaps(&self, other: &PathPattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.loose_cmp(b) == Ordering::Equal)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Route<T> {
    pub pattern: PathPattern,
    pub value: T,
}

/// A route resolved against an address
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a, T> {
    pub pattern: &'a PathPattern,
    pub value: &'a T,
    pub params: BTreeMap<String, String>,
}

/// A sorted set of non-overlapping routes
///
/// Routes are grouped by segment count and sorted within each group, so a
/// lookup only considers patterns of the address's length. No two routes
/// may match the same address.
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    by_len: BTreeMap<usize, Vec<Route<T>>>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self {
            by_len: BTreeMap::new(),
        }
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(pattern, value)` pairs
    pub fn build<I, S>(routes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for (pattern, value) in routes {
            table.insert(PathPattern::parse(pattern.as_ref())?, value)?;
        }
        Ok(table)
    }

    /// Add a route, rejecting it if it overlaps an existing one
    pub fn insert(&mut self, pattern: PathPattern, value: T) -> Result<()> {
        let group = self.by_len.entry(pattern.segments.len()).or_default();
        if let Some(existing) = group.iter().find(|r| r.pattern.overlaps(&pattern)) {
            return Err(ActorError::AmbiguousRoute(
                pattern.to_string(),
                existing.pattern.to_string(),
            ));
        }
        let at = group.partition_point(|r| r.pattern < pattern);
        group.insert(at, Route { pattern, value });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_len.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_len.is_empty()
    }

    /// Routes in table order
    pub fn routes(&self) -> impl Iterator<Item = &Route<T>> {
        self.by_len.values().flatten()
    }

    pub fn find(&self, address: &Address) -> Option<RouteMatch<'_, T>> {
        let group = self.by_len.get(&address.len())?;
        group.iter().find_map(|route| {
            route.pattern.matches(address).map(|params| RouteMatch {
                pattern: &route.pattern,
                value: &route.value,
                params,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(path: &str) -> Address {
        Address::create(path).unwrap()
    }

    fn table() -> RouteTable<&'static str> {
        RouteTable::build([
            ("shop/{cart}/items", "items"),
            ("shop/checkout", "checkout"),
            ("users/{id}", "user"),
            ("users/{id}/orders/{}", "order"),
            ("health", "health"),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let pattern = PathPattern::parse("/users/{id}/orders/{}/").unwrap();
        assert_eq!(pattern.to_string(), "users/{id}/orders/{}");
        assert_eq!(pattern.segments().len(), 4);
        assert!(PathPattern::parse("a//b").is_err());
        assert!(PathPattern::parse("a/{b").is_err());
        assert!(PathPattern::parse("").is_err());
    }

    #[test]
    fn test_find_captures_params() {
        let table = table();
        let found = table.find(&addr("users/7/orders/99")).unwrap();
        assert_eq!(*found.value, "order");
        assert_eq!(found.params.get("id").map(String::as_str), Some("7"));
        assert_eq!(found.params.len(), 1);
    }

    #[test]
    fn test_find_literal_routes() {
        let table = table();
        assert_eq!(*table.find(&addr("shop/checkout")).unwrap().value, "checkout");
        assert_eq!(*table.find(&addr("shop/c1/items")).unwrap().value, "items");
        assert_eq!(*table.find(&addr("health")).unwrap().value, "health");
    }

    #[test]
    fn test_no_match() {
        let table = table();
        assert!(table.find(&addr("shop")).is_none());
        assert!(table.find(&addr("users/7/carts")).is_none());
        assert!(table.find(&addr("nothing/here/at/all/really")).is_none());
    }

    #[test]
    fn test_nested_resource_routes() {
        let table = RouteTable::build([
            ("/orders", "orders"),
            ("/orders/{id}", "order"),
            ("/orders/{id}/releases", "releases"),
            ("/orders/{id}/releases/{id}", "release"),
        ])
        .unwrap();

        for (path, expected) in [
            ("/orders", "orders"),
            ("/orders/1", "order"),
            ("/orders/1/releases", "releases"),
            ("/orders/1/releases/1", "release"),
        ] {
            assert_eq!(*table.find(&addr(path)).unwrap().value, expected, "{}", path);
        }
        assert!(table.find(&addr("/shippers")).is_none());
        assert!(table.find(&addr("/orders/1/customer")).is_none());
    }

    #[test]
    fn test_param_route_after_unrelated_literals() {
        // Sorted order puts `{p}/y` last; `a/y` is greater than both
        // literal routes yet only matches the parameter route.
        let table = RouteTable::build([("a/z", "az"), ("b/x", "bx"), ("{p}/y", "py")]).unwrap();
        let order: Vec<String> = table.routes().map(|r| r.pattern.to_string()).collect();
        assert_eq!(order, vec!["a/z", "b/x", "{p}/y"]);

        let found = table.find(&addr("a/y")).unwrap();
        assert_eq!(*found.value, "py");
        assert_eq!(found.params.get("p").map(String::as_str), Some("a"));
        assert_eq!(*table.find(&addr("c/y")).unwrap().value, "py");
        assert!(table.find(&addr("a/x")).is_none());
    }

    #[test]
    fn test_rejects_ambiguous_patterns() {
        let err = RouteTable::build([("users/{id}", 1), ("users/me", 2)]).unwrap_err();
        assert!(matches!(err, ActorError::AmbiguousRoute(..)));

        let err = RouteTable::build([("a/{x}", 1), ("{y}/b", 2)]).unwrap_err();
        assert!(matches!(err, ActorError::AmbiguousRoute(..)));

        // Different lengths never overlap
        assert!(RouteTable::build([("a/{x}", 1), ("a/{x}/b", 2)]).is_ok());
    }

    #[test]
    fn test_table_order() {
        let table = table();
        let order: Vec<String> = table.routes().map(|r| r.pattern.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "health",
                "shop/checkout",
                "users/{id}",
                "shop/{cart}/items",
                "users/{id}/orders/{}",
            ]
        );
        assert_eq!(table.len(), 5);
    }
}
