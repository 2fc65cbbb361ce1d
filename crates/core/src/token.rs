//! Token issuance.
//!
//! A token is the department prefix followed by the department's counter value, e.g. `C-23`.
//! Issuing a token advances the stored counter in one atomic datastore step, so concurrent
//! registrations never receive the same number and no number is skipped.

use crate::department::{validate_prefix, Department};
use crate::store::QueueStore;
use crate::{QueueError, QueueResult};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A queue token such as `C-23`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenNumber {
    prefix: String,
    sequence: u64,
}

impl TokenNumber {
    pub fn new(prefix: impl Into<String>, sequence: u64) -> Self {
        Self {
            prefix: prefix.into(),
            sequence,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for TokenNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.sequence)
    }
}

impl FromStr for TokenNumber {
    type Err = QueueError;

    /// Parses `<prefix>-<sequence>`, splitting on the last hyphen.
    ///
    /// The sequence is written exactly as issued: digits only, no leading zeros.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QueueError::InvalidInput(format!("invalid token number '{}'", s));

        let (prefix, sequence) = s.rsplit_once('-').ok_or_else(invalid)?;
        if sequence.is_empty()
            || sequence.starts_with('0')
            || !sequence.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let sequence = sequence.parse::<u64>().map_err(|_| invalid())?;
        let prefix = validate_prefix(prefix).map_err(|_| invalid())?;

        Ok(Self::new(prefix.into_inner(), sequence))
    }
}

/// A freshly issued token and the department state it was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// The department after its counter was advanced.
    pub department: Department,
    pub token: TokenNumber,
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn QueueStore>,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Issues the next token of the department named `department_name`.
    ///
    /// # Errors
    ///
    /// - `QueueError::DepartmentNotFound` if no such department exists.
    /// - Transient errors from the datastore.
    pub async fn issue_token(&self, department_name: &str) -> QueueResult<IssuedToken> {
        let department = self
            .store
            .department_by_name(department_name)
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(department_name.to_string()))?;

        self.issue_for(&department).await
    }

    /// Issues the next token of an already loaded department.
    ///
    /// Only the id is used; the counter value comes from the datastore.
    pub async fn issue_for(&self, department: &Department) -> QueueResult<IssuedToken> {
        let updated = self
            .store
            .increment_counter(&department.id)
            .await?
            .ok_or_else(|| QueueError::DepartmentNotFound(department.name.to_string()))?;

        let token = TokenNumber::new(updated.prefix.as_str(), updated.current_token);
        tracing::info!(department = %updated.name, token = %token, "issued token");
        Ok(IssuedToken {
            department: updated,
            token,
        })
    }
}
