//! Row materialization.
//!
//! Reads rows from a [`RowCursor`] and populates entity values:
//!
//! - **Shape**: each [`Entity`] registers its fields and setters once via
//!   [`EntityShape`].
//! - **Accessors**: an [`AccessorBuilder`] turns writable fields into
//!   assigners; tables are cached in the shared expiring store keyed by
//!   type path and matched field set.
//! - **Coercion**: raw column values are converted into the declared field
//!   type before assignment; the first failure aborts the call.

mod accessor;
mod coerce;
mod cursor;
mod materializer;
mod query;
mod shape;
mod value;

pub use accessor::{AccessorBuilder, AccessorTable, Assigner, SetterBuilder};
pub use coerce::{coerce, parse_interval, parse_timestamp};
pub use cursor::{Column, RowCursor, RowSet, RowSetCursor};
pub use materializer::Materializer;
pub use query::{CommandKind, Connection, Parameter, Query};
pub use shape::{
    DbEnum, DeclaredType, Entity, EntityShape, EnumInfo, FieldDescriptor, FieldType, RawSetter,
    Scalar, TypeTag,
};
pub use value::{Value, ValueKind, format_interval};

pub(crate) use materializer::{METRIC_ACCESSOR_BUILD, METRIC_MATERIALIZE_MS, METRIC_MATERIALIZE_ROWS};
