//! Quota manager interface.
//!
//! The quota interceptor (`rpc/interceptor/quota.rs`) derives a set of
//! [`Spec`]s for each call and charges tokens against all of them. How tokens
//! are accounted is up to the manager.

use std::fmt;

use async_trait::async_trait;

/// Scope a quota applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    Global,
    Tree(i64),
    User(String),
}

/// Direction of the charged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Read,
    Write,
}

/// A single quota bucket to charge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spec {
    pub group: Group,
    pub kind: Kind,
}

impl Spec {
    pub fn new(group: Group, kind: Kind) -> Self {
        Self { group, kind }
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Read => "read",
            Kind::Write => "write",
        };
        match &self.group {
            Group::Global => write!(f, "global/{kind}"),
            Group::Tree(id) => write!(f, "trees/{id}/{kind}"),
            Group::User(user) => write!(f, "users/{user}/{kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuotaError {
    #[error("quota exhausted for {0}")]
    Exhausted(String),
    #[error("quota manager unavailable: {0}")]
    Unavailable(String),
}

/// Token accounting backend.
#[async_trait]
pub trait QuotaManager: Send + Sync {
    /// Acquire `num` tokens from every spec, or fail without charging.
    async fn get_tokens(&self, num: u32, specs: &[Spec]) -> Result<(), QuotaError>;

    /// Return previously acquired tokens.
    async fn put_tokens(&self, num: u32, specs: &[Spec]) -> Result<(), QuotaError>;
}

/// A manager that grants every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopManager;

#[async_trait]
impl QuotaManager for NoopManager {
    async fn get_tokens(&self, _num: u32, _specs: &[Spec]) -> Result<(), QuotaError> {
        Ok(())
    }

    async fn put_tokens(&self, _num: u32, _specs: &[Spec]) -> Result<(), QuotaError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_names() {
        assert_eq!(Spec::new(Group::Global, Kind::Read).to_string(), "global/read");
        assert_eq!(Spec::new(Group::Tree(12), Kind::Write).to_string(), "trees/12/write");
        assert_eq!(
            Spec::new(Group::User("alice".into()), Kind::Read).to_string(),
            "users/alice/read"
        );
    }
}
