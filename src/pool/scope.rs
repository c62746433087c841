//! Pooling scope derivation.

use std::fmt;

use crate::transport::Authority;

/// Partition key for connection pooling: one pool exists per
/// (service, authority) pair.
///
/// Immutable once created; identity equality makes it usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolingScope {
    service: String,
    authority: Authority,
}

impl PoolingScope {
    /// Derive the scope for a logical service talking to an authority.
    pub fn new(service: impl Into<String>, authority: Authority) -> Self {
        Self {
            service: service.into(),
            authority,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }
}

impl fmt::Display for PoolingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service, self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn scopes_partition_by_service_and_authority() {
        let a: Authority = "10.0.0.1:8080".parse().unwrap();
        let s1 = PoolingScope::new("search", a.clone());
        let s2 = PoolingScope::new("search", a.clone());
        let s3 = PoolingScope::new("billing", a);

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        let mut map = HashMap::new();
        map.insert(s1, 1);
        map.insert(s3, 2);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&s2], 1);
    }
}
