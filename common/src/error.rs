// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the network-server core.
//!
//! These errors may be generated while handling a caller request (enqueue,
//! admin CRUD) or as part of background dispatch.  The gRPC layer maps them
//! onto status codes as one of the last steps of request processing, which
//! keeps the rest of the system agnostic of the transport.
//!
//! Where possible we reuse existing variants rather than inventing new ones
//! to distinguish cases that no programmatic consumer needs to distinguish.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An error that can be generated within the scheduling core.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// An object needed as part of this operation was not found.
    #[error("Object (of type {type_name:?}) not found: {lookup_type:?}")]
    ObjectNotFound {
        type_name: ResourceType,
        lookup_type: LookupType,
    },
    /// An object already exists with the specified identifier.
    #[error("Object (of type {type_name:?}) already exists: {object_name}")]
    ObjectAlreadyExists {
        type_name: ResourceType,
        object_name: String,
    },
    /// The request was well-formed, but the operation cannot be completed
    /// given the current state of the system.
    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },
    /// The specified input field is not valid.
    #[error("Invalid Value: {label}, {message}")]
    InvalidValue { label: String, message: String },
    /// The system encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
    /// The system (or part of it) is unavailable.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable { message: String },
}

/// Resources this core operates on.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum ResourceType {
    Device,
    Gateway,
    MulticastGroup,
    MulticastGroupMembership,
    MulticastQueueItem,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResourceType::Device => "device",
            ResourceType::Gateway => "gateway",
            ResourceType::MulticastGroup => "multicast group",
            ResourceType::MulticastGroupMembership => {
                "multicast group membership"
            }
            ResourceType::MulticastQueueItem => "multicast queue item",
        })
    }
}

/// Indicates how an object was looked up (for an `ObjectNotFound` error).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum LookupType {
    /// a specific id was requested
    ById(Uuid),
    /// a specific name or composite identifier was requested
    ByName(String),
    /// some other lookup type was used
    Other(String),
}

impl LookupType {
    pub fn into_not_found(self, type_name: ResourceType) -> Error {
        Error::ObjectNotFound {
            type_name,
            lookup_type: self,
        }
    }
}

impl Error {
    /// Returns whether the error is likely transient and could reasonably
    /// be retried.
    pub fn retryable(&self) -> bool {
        match self {
            Error::ServiceUnavailable { .. } => true,

            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::InvalidRequest { .. }
            | Error::InvalidValue { .. }
            | Error::InternalError { .. } => false,
        }
    }

    /// Generates an [`Error::ObjectNotFound`] error for a lookup by id.
    pub fn not_found_by_id(type_name: ResourceType, id: &Uuid) -> Error {
        Error::ObjectNotFound {
            type_name,
            lookup_type: LookupType::ById(*id),
        }
    }

    pub fn invalid_request(message: &str) -> Error {
        Error::InvalidRequest {
            message: message.to_owned(),
        }
    }

    pub fn invalid_value(label: &str, message: &str) -> Error {
        Error::InvalidValue {
            label: label.to_owned(),
            message: message.to_owned(),
        }
    }

    /// InternalError should be used for operational conditions that should
    /// not happen but that we cannot reasonably handle at runtime.
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError {
            internal_message: internal_message.to_owned(),
        }
    }

    /// This should be used for transient failures where the caller might be
    /// expected to retry.
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable {
            message: message.to_owned(),
        }
    }
}

/// Result of a create operation for the specified type.
pub type CreateResult<T> = Result<T, Error>;
/// Result of a lookup operation for the specified type.
pub type LookupResult<T> = Result<T, Error>;
/// Result of a list operation returning all items at once.
pub type ListResultVec<T> = Result<Vec<T>, Error>;
/// Result of an update operation.
pub type UpdateResult<T> = Result<T, Error>;
/// Result of a delete operation.
pub type DeleteResult = Result<(), Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(Error::unavail("db down").retryable());
        assert!(!Error::invalid_request("bad fport").retryable());
        assert!(!Error::internal_error("oops").retryable());
        assert!(!Error::not_found_by_id(
            ResourceType::MulticastGroup,
            &Uuid::nil()
        )
        .retryable());
    }
}
