use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Separator between the parts of a stream name.
const SEPARATOR: char = '-';

/// Errors produced when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The stream name does not start with the expected aggregate type.
    #[error("stream '{stream}' does not belong to aggregate type '{aggregate_type}'")]
    WrongAggregateType {
        aggregate_type: String,
        stream: String,
    },

    /// The stream name is missing the tenant or object id part.
    #[error("malformed stream name '{0}'")]
    Malformed(String),
}

/// Name of the tenant that owns an aggregate.
///
/// Tenant names are used as a segment of the stream name, so they must not
/// contain `-`. Commands validate this before anything touches the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenant(String);

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns true if the name can be embedded in a stream name.
    pub fn is_well_formed(&self) -> bool {
        !self.is_empty() && !self.0.contains(SEPARATOR)
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tenant {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Tenant {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of an entity within a tenant (contact id, location id, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a new random object id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Composite key of an aggregate: tenant plus entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub tenant: Tenant,
    pub object_id: ObjectId,
}

impl AggregateKey {
    pub fn new(tenant: impl Into<Tenant>, object_id: impl Into<ObjectId>) -> Self {
        Self {
            tenant: tenant.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.tenant, self.object_id)
    }
}

/// Identifier of one event stream.
///
/// Rendered as `"{aggregate_type}-{tenant}-{object_id}"`, which is the value
/// stored in the `aggregate_id` column of the event log and the event buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateId {
    aggregate_type: String,
    key: AggregateKey,
}

impl AggregateId {
    pub fn new(aggregate_type: impl Into<String>, key: AggregateKey) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            key,
        }
    }

    /// Parses a stream name produced by [`AggregateId`]'s `Display` impl.
    ///
    /// The tenant is everything up to the first separator after the type
    /// prefix; the object id is the remainder and may itself contain `-`.
    pub fn parse(aggregate_type: &str, stream: &str) -> Result<Self, IdError> {
        let rest = stream
            .strip_prefix(aggregate_type)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .ok_or_else(|| IdError::WrongAggregateType {
                aggregate_type: aggregate_type.to_string(),
                stream: stream.to_string(),
            })?;

        let (tenant, object_id) = rest
            .split_once(SEPARATOR)
            .filter(|(tenant, object_id)| !tenant.is_empty() && !object_id.is_empty())
            .ok_or_else(|| IdError::Malformed(stream.to_string()))?;

        Ok(Self::new(aggregate_type, AggregateKey::new(tenant, object_id)))
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn key(&self) -> &AggregateKey {
        &self.key
    }

    pub fn tenant(&self) -> &Tenant {
        &self.key.tenant
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.key.object_id
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.aggregate_type, self.key)
    }
}

impl std::str::FromStr for AggregateId {
    type Err = IdError;

    /// Parses a stream name whose aggregate type is the first segment.
    fn from_str(stream: &str) -> Result<Self, Self::Err> {
        let (aggregate_type, _) = stream
            .split_once(SEPARATOR)
            .ok_or_else(|| IdError::Malformed(stream.to_string()))?;
        Self::parse(aggregate_type, stream)
    }
}

impl Serialize for AggregateId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AggregateId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stream = String::deserialize(deserializer)?;
        stream.parse().map_err(serde::de::Error::custom)
    }
}
