//! Identifier newtypes and the caller context
//!
//! Every tenant-scoped object is addressed by a string identifier. The
//! newtypes keep customer, user, project, domain and job identifiers from
//! being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Tenant identifier; every cache key and job is scoped by it
    CustomerId
);
string_id!(
    /// User identifier within a customer
    UserId
);
string_id!(
    /// Project identifier within a customer
    ProjectId
);
string_id!(
    /// Domain (root table) identifier within a project
    DomainId
);

/// Unique identifier for an analysis or hierarchy job
///
/// Generated as a UUID v4 on submission. Identifiers received from a
/// polling client go through [`JobId::parse`], which rejects anything that
/// is not a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new randomly generated job id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parse a job id supplied by a client
    pub fn parse(s: &str) -> Result<Self, JobIdError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(JobIdError::Empty);
        }
        if uuid::Uuid::parse_str(trimmed).is_err() {
            return Err(JobIdError::InvalidFormat(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for job id parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobIdError {
    /// The input is blank
    Empty,
    /// The input is not a valid UUID
    InvalidFormat(String),
}

impl fmt::Display for JobIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobIdError::Empty => write!(f, "Invalid job id: empty"),
            JobIdError::InvalidFormat(s) => {
                write!(f, "Invalid job id: '{}' is not a valid UUID format", s)
            }
        }
    }
}

impl std::error::Error for JobIdError {}

/// Project access roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// May run analyses and see own jobs
    Read,
    /// May see every job on the project
    Write,
}

/// Authenticated caller, as handed over by the request layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserContext {
    /// Tenant of the caller
    pub customer_id: CustomerId,
    /// The caller
    pub user_id: UserId,
}

impl UserContext {
    /// Create a caller context
    pub fn new(customer_id: impl Into<CustomerId>, user_id: impl Into<UserId>) -> Self {
        Self {
            customer_id: customer_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(JobId::parse(id.as_str()).unwrap(), id);
        assert_eq!(JobId::parse("  "), Err(JobIdError::Empty));
        assert!(matches!(
            JobId::parse("../etc/passwd"),
            Err(JobIdError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_string_ids() {
        let customer = CustomerId::from("acme");
        assert_eq!(customer.as_str(), "acme");
        assert_eq!(customer.to_string(), "acme");
        let ctx = UserContext::new("acme", "alice");
        assert_eq!(ctx.user_id, UserId::new("alice"));
    }
}
