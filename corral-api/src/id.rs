//! # Work Identifiers
//!
//! A work item is identified by one of three kinds of value: a sequence
//! number handed out by the pool, a random GUID handed out by the pool, or a
//! caller-supplied name. [`WorkId::None`] is the "no identifier" sentinel used
//! wherever a lookup can come back empty; it is an ordinary variant, so it can
//! be compared and hashed like any other id.
//!
//! Identifiers of different kinds never compare equal, even when their
//! printed forms coincide (`Seq(7)` is not `Name("7")`).

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::IdError;

/// Identifier of a submitted work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum WorkId {
    /// Absent / not found.
    #[default]
    None,
    /// Monotonically increasing number assigned by the pool.
    Seq(u64),
    /// Random 128-bit value assigned by the pool.
    Guid(Uuid),
    /// Caller-supplied name.
    Name(Arc<str>),
}

/// The kind of a [`WorkId`], used for generation settings and conversion errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Sequential,
    Guid,
    Name,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdKind::Sequential => "sequential",
            IdKind::Guid => "guid",
            IdKind::Name => "name",
        };
        f.write_str(name)
    }
}

impl WorkId {
    /// Generate a fresh GUID identifier.
    pub fn new_guid() -> Self {
        WorkId::Guid(Uuid::new_v4())
    }

    /// Kind of this identifier, or `None` for the absent sentinel.
    pub fn kind(&self) -> Option<IdKind> {
        match self {
            WorkId::None => None,
            WorkId::Seq(_) => Some(IdKind::Sequential),
            WorkId::Guid(_) => Some(IdKind::Guid),
            WorkId::Name(_) => Some(IdKind::Name),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, WorkId::None)
    }

    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// The sequence number, if this is a sequential id.
    pub fn as_seq(&self) -> Result<u64, IdError> {
        match self {
            WorkId::Seq(n) => Ok(*n),
            other => Err(other.mismatch(IdKind::Sequential)),
        }
    }

    /// The GUID, if this is a GUID id.
    pub fn as_guid(&self) -> Result<Uuid, IdError> {
        match self {
            WorkId::Guid(g) => Ok(*g),
            other => Err(other.mismatch(IdKind::Guid)),
        }
    }

    /// The caller-supplied name, if this is a named id.
    pub fn as_name(&self) -> Result<&str, IdError> {
        match self {
            WorkId::Name(s) => Ok(s),
            other => Err(other.mismatch(IdKind::Name)),
        }
    }

    fn mismatch(&self, expected: IdKind) -> IdError {
        match self.kind() {
            Some(found) => IdError::WrongKind { expected, found },
            None => IdError::Absent,
        }
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkId::None => f.write_str("<none>"),
            WorkId::Seq(n) => write!(f, "{}", n),
            WorkId::Guid(g) => write!(f, "{}", g),
            WorkId::Name(s) => f.write_str(s),
        }
    }
}

impl From<u64> for WorkId {
    fn from(value: u64) -> Self {
        WorkId::Seq(value)
    }
}

impl From<Uuid> for WorkId {
    fn from(value: Uuid) -> Self {
        WorkId::Guid(value)
    }
}

impl From<&str> for WorkId {
    fn from(value: &str) -> Self {
        WorkId::Name(Arc::from(value))
    }
}

impl From<String> for WorkId {
    fn from(value: String) -> Self {
        WorkId::Name(Arc::from(value))
    }
}

impl From<&WorkId> for WorkId {
    fn from(value: &WorkId) -> Self {
        value.clone()
    }
}

impl TryFrom<&WorkId> for u64 {
    type Error = IdError;

    fn try_from(value: &WorkId) -> Result<Self, Self::Error> {
        value.as_seq()
    }
}

impl TryFrom<&WorkId> for Uuid {
    type Error = IdError;

    fn try_from(value: &WorkId) -> Result<Self, Self::Error> {
        value.as_guid()
    }
}

impl TryFrom<&WorkId> for String {
    type Error = IdError;

    fn try_from(value: &WorkId) -> Result<Self, Self::Error> {
        value.as_name().map(str::to_string)
    }
}
