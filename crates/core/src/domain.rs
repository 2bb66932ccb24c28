//! Short-URL host to domain-id resolution
//!
//! Vanity short URLs are hosted on one of a small set of short domains, each
//! identified by a numeric id on the vendor API. When a code is recreated on
//! another account its short URL can only be preserved by re-asserting the
//! `(short_code, domain_id)` pair, so the original short URL's host has to be
//! mapped back to the id of the domain that served it.

/// Numeric identifier of a short-URL hosting domain.
pub type DomainId = u32;

/// Ordered prefix table consulted by [`resolve`]. First match wins.
pub const DOMAIN_TABLE: &[(&str, DomainId)] = &[
    ("http://q-r.to/", 1),
    ("http://l.ead.me/", 2),
    ("https://l.ead.me/", 3),
    ("https://qrco.de/", 4),
];

/// Resolve a short URL to the id of its hosting domain.
///
/// Returns `None` when no prefix in [`DOMAIN_TABLE`] matches. The caller
/// decides what an unmatched host means via [`UnmatchedDomainPolicy`]; this
/// function never silently substitutes a default.
pub fn resolve(short_url: &str) -> Option<DomainId> {
    DOMAIN_TABLE
        .iter()
        .find(|(prefix, _)| short_url.starts_with(prefix))
        .map(|&(_, id)| id)
}

/// Policy for short URLs whose host is not in the domain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedDomainPolicy {
    /// Treat an unmatched host as a per-record data error.
    Reject,
    /// Assign the given domain id to unmatched hosts.
    DefaultTo(DomainId),
}

/// Error raised under [`UnmatchedDomainPolicy::Reject`].
#[derive(Debug, PartialEq, Eq)]
pub struct UnmatchedDomain(pub String);

impl std::fmt::Display for UnmatchedDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "short URL host not in domain table: {}", self.0)
    }
}

impl std::error::Error for UnmatchedDomain {}

impl UnmatchedDomainPolicy {
    /// Resolve a short URL under this policy.
    pub fn resolve(&self, short_url: &str) -> Result<DomainId, UnmatchedDomain> {
        match (resolve(short_url), self) {
            (Some(id), _) => Ok(id),
            (None, UnmatchedDomainPolicy::DefaultTo(id)) => Ok(*id),
            (None, UnmatchedDomainPolicy::Reject) => {
                Err(UnmatchedDomain(short_url.to_string()))
            }
        }
    }
}
