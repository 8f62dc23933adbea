// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation of Diesel errors into the public error model.
//!
//! Callers of the datastore never see Diesel types.  Two query outcomes
//! are caller-visible and get first-class errors: a lookup that matched
//! no row (`ObjectNotFound`) and an insert that tripped a unique
//! constraint (`ObjectAlreadyExists`).  Everything else is an
//! operational failure and surfaces as internal or, for dropped
//! connections, as a retryable unavailability.

use diesel::result::{
    DatabaseErrorInformation, DatabaseErrorKind as DieselErrorKind,
    Error as DieselError,
};
use lorikeet_common::{Error as PublicError, LookupType, ResourceType};

/// Error type used inside datastore transactions.
///
/// A transaction body can fail two ways: a statement errors out
/// (`Query`), or the operation's own logic decides the transaction must
/// not commit (`Abort`).  Both roll the transaction back; only `Abort`
/// carries an error that was already shaped for the caller.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError<T> {
    /// The operation bailed with a caller-facing error.
    #[error("transaction aborted: {0}")]
    Abort(T),

    /// A statement inside the transaction failed.
    #[error("transaction query failed: {0}")]
    Query(#[from] DieselError),
}

impl From<PublicError> for TransactionError<PublicError> {
    fn from(e: PublicError) -> Self {
        TransactionError::Abort(e)
    }
}

impl From<TransactionError<PublicError>> for PublicError {
    fn from(e: TransactionError<PublicError>) -> Self {
        match e {
            TransactionError::Abort(e) => e,
            TransactionError::Query(e) => {
                map_diesel_error(e, ErrorHandler::Operational)
            }
        }
    }
}

/// What a failed query means to the caller.
///
/// Picked per call site: the same `DieselError::NotFound` is a
/// caller-visible miss when the caller named a specific row, and a bug
/// when it came from a query that cannot legitimately miss.
pub enum ErrorHandler<'a> {
    /// The query addressed one specific row (get, update, delete by
    /// key).  A miss becomes `ObjectNotFound` for the named resource.
    Lookup(ResourceType, LookupType),
    /// The query inserted a row whose unique constraint doubles as its
    /// existence check.  A unique violation becomes
    /// `ObjectAlreadyExists` carrying the given object name.
    Insert(ResourceType, &'a str),
    /// The query has no caller-visible failure mode; any error is
    /// operational.
    Operational,
}

/// Convert a Diesel error into a public error, interpreting it per the
/// given [`ErrorHandler`].
pub fn map_diesel_error(
    error: DieselError,
    handler: ErrorHandler<'_>,
) -> PublicError {
    match handler {
        ErrorHandler::Lookup(resource_type, lookup_type) => match error {
            DieselError::NotFound => {
                lookup_type.into_not_found(resource_type)
            }
            other => operational_error(other),
        },
        ErrorHandler::Insert(resource_type, object_name) => match error {
            DieselError::DatabaseError(
                DieselErrorKind::UniqueViolation,
                _,
            ) => PublicError::ObjectAlreadyExists {
                type_name: resource_type,
                object_name: object_name.to_string(),
            },
            other => operational_error(other),
        },
        ErrorHandler::Operational => operational_error(error),
    }
}

fn operational_error(error: DieselError) -> PublicError {
    match error {
        DieselError::DatabaseError(kind, info) => match kind {
            // A torn-down connection is worth retrying; anything else
            // the database reports at this point is a programming or
            // schema problem.
            DieselErrorKind::ClosedConnection => {
                PublicError::unavail(&database_error_summary(kind, &*info))
            }
            _ => PublicError::internal_error(&database_error_summary(
                kind, &*info,
            )),
        },
        error => PublicError::internal_error(&format!(
            "unexpected database error: {:#?}",
            error
        )),
    }
}

/// One-line rendering of a database error with the details that help
/// in a log line.
fn database_error_summary(
    kind: DieselErrorKind,
    info: &dyn DatabaseErrorInformation,
) -> String {
    let mut summary = format!("{:?}: {}", kind, info.message());
    if let Some(details) = info.details() {
        summary.push_str(&format!(" ({})", details));
    }
    if let Some(constraint) = info.constraint_name() {
        summary.push_str(&format!(" [constraint: {}]", constraint));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_miss_becomes_object_not_found() {
        let err = map_diesel_error(
            DieselError::NotFound,
            ErrorHandler::Lookup(
                ResourceType::MulticastGroup,
                LookupType::ById(uuid::Uuid::nil()),
            ),
        );
        assert!(matches!(err, PublicError::ObjectNotFound { .. }));
    }

    #[test]
    fn operational_miss_is_a_bug() {
        let err = map_diesel_error(
            DieselError::NotFound,
            ErrorHandler::Operational,
        );
        assert!(matches!(err, PublicError::InternalError { .. }));
    }

    #[test]
    fn abort_round_trips_the_public_error() {
        let aborted: TransactionError<PublicError> =
            PublicError::invalid_request("bad f_port").into();
        assert_eq!(
            PublicError::from(aborted),
            PublicError::invalid_request("bad f_port"),
        );
    }
}
