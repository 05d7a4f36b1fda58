//! Endpoint classification table.
//!
//! Each pattern is a path of `/`-separated segments where `*` matches any
//! single segment. A pattern matches a path when it is a segment-wise prefix
//! of it. The most specific match wins: more literal segments first, then
//! more segments overall, then declaration order.

use serde::{Deserialize, Serialize};

/// Which identities an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointScope {
    /// Storefront shopper endpoints.
    CustomerScoped,
    /// Dashboard endpoints.
    MerchantScoped,
    /// Accepts either identity.
    DualEligible,
    /// No pattern matched.
    Unclassified,
}

/// A single table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<String>,
    scope: EndpointScope,
}

impl RoutePattern {
    /// Create a pattern such as `/products/*/reviews`.
    #[must_use]
    pub fn new(pattern: &str, scope: EndpointScope) -> Self {
        Self {
            segments: split_segments(pattern).map(str::to_string).collect(),
            scope,
        }
    }

    /// Scope assigned to matching paths.
    #[must_use]
    pub const fn scope(&self) -> EndpointScope {
        self.scope
    }

    fn matches(&self, path: &[&str]) -> bool {
        self.segments.len() <= path.len()
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(pattern, segment)| pattern == "*" || pattern.eq_ignore_ascii_case(segment))
    }

    fn specificity(&self) -> (usize, usize) {
        let literal = self.segments.iter().filter(|s| *s != "*").count();
        (literal, self.segments.len())
    }
}

/// Declarative endpoint-to-scope table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    patterns: Vec<RoutePattern>,
}

impl RouteTable {
    /// An empty table; every path is unclassified.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Add a pattern.
    #[must_use]
    pub fn with(mut self, pattern: &str, scope: EndpointScope) -> Self {
        self.patterns.push(RoutePattern::new(pattern, scope));
        self
    }

    /// Classify a request path. Query strings are ignored.
    #[must_use]
    pub fn classify(&self, path: &str) -> EndpointScope {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = split_segments(path).collect();

        let mut best: Option<&RoutePattern> = None;
        for pattern in self.patterns.iter().filter(|p| p.matches(&segments)) {
            if best.is_none_or(|b| pattern.specificity() > b.specificity()) {
                best = Some(pattern);
            }
        }
        best.map_or(EndpointScope::Unclassified, RoutePattern::scope)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        use EndpointScope::{CustomerScoped, DualEligible, MerchantScoped};

        Self::empty()
            // Storefront shopper
            .with("/customer", CustomerScoped)
            .with("/customers/me", CustomerScoped)
            .with("/cart", CustomerScoped)
            .with("/checkout", CustomerScoped)
            .with("/wallet", CustomerScoped)
            .with("/wishlist", CustomerScoped)
            .with("/storefront", CustomerScoped)
            .with("/account", CustomerScoped)
            .with("/products/*/reviews", CustomerScoped)
            // Dashboard
            .with("/orders", MerchantScoped)
            .with("/products", MerchantScoped)
            .with("/prices", MerchantScoped)
            .with("/inventory", MerchantScoped)
            .with("/customers", MerchantScoped)
            .with("/staff", MerchantScoped)
            .with("/domains", MerchantScoped)
            .with("/tenants", MerchantScoped)
            .with("/settings", MerchantScoped)
            .with("/analytics", MerchantScoped)
            .with("/support", MerchantScoped)
            // Either
            .with("/auth", DualEligible)
            .with("/notifications", DualEligible)
            .with("/uploads", DualEligible)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
