//! Turns cursor rows into entity values.
//!
//! Columns are matched to writable fields ignoring case. The accessor table
//! for a given entity and matched field set is built once and kept in the
//! shared [`ExpiringStore`]; later calls with the same shape reuse it until
//! the entry idles out.

use std::any::type_name;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, instrument, warn};

use super::accessor::{AccessorBuilder, AccessorTable, Assigner, SetterBuilder};
use super::coerce::coerce;
use super::cursor::{RowCursor, RowSet};
use super::query::{Connection, Query};
use super::shape::{Entity, FieldDescriptor};
use super::value::Value;
use crate::cache::ExpiringStore;
use crate::error::{CoercionError, DrainError};

pub(crate) const METRIC_ACCESSOR_BUILD: &str = "rowdrain_accessor_build_total";
pub(crate) const METRIC_MATERIALIZE_ROWS: &str = "rowdrain_materialize_rows_total";
pub(crate) const METRIC_MATERIALIZE_MS: &str = "rowdrain_materialize_ms";

/// A writable field paired with the column it reads from.
struct Binding<T> {
    field: FieldDescriptor<T>,
    ordinal: usize,
}

/// Populates entities from row cursors, caching accessor tables per shape.
pub struct Materializer<B = SetterBuilder> {
    store: Arc<ExpiringStore>,
    builder: B,
}

impl Materializer<SetterBuilder> {
    pub fn new(store: Arc<ExpiringStore>) -> Self {
        Self::with_builder(store, SetterBuilder)
    }
}

impl<B: AccessorBuilder> Materializer<B> {
    pub fn with_builder(store: Arc<ExpiringStore>, builder: B) -> Self {
        Self { store, builder }
    }

    pub fn store(&self) -> &Arc<ExpiringStore> {
        &self.store
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Drain `cursor`, producing one `T` per row in cursor order.
    ///
    /// Fields without a matching column keep their default. Null columns
    /// assign the field's zero value (or `None`). The first value that
    /// cannot be coerced aborts the call; no partial result is returned.
    #[instrument(skip_all, fields(entity = T::entity_name()))]
    pub fn materialize<T, C>(&self, cursor: &mut C) -> Result<Vec<T>, DrainError>
    where
        T: Entity,
        C: RowCursor + ?Sized,
    {
        let started_at = Instant::now();

        let bindings = bind_columns::<T, C>(cursor)?;
        let table = self.accessor_table(&bindings)?;
        let plan = bindings
            .iter()
            .map(|binding| {
                table
                    .get(binding.field.name())
                    .map(|assign| (binding, assign))
                    .ok_or_else(|| {
                        DrainError::cursor(format!(
                            "accessor table `{}` lacks field `{}`",
                            table.key(),
                            binding.field.name()
                        ))
                    })
            })
            .collect::<Result<Vec<(&Binding<T>, &Assigner<T>)>, DrainError>>()?;

        let mut entities = Vec::new();
        while cursor.advance()? {
            let mut entity = T::default();
            for (binding, assign) in &plan {
                let raw = cursor.value(binding.ordinal).ok_or_else(|| {
                    DrainError::cursor(format!("column {} missing from current row", binding.ordinal))
                })?;
                let value = coerce_field::<T>(&binding.field, raw)?;
                assign(&mut entity, value)?;
            }
            entities.push(entity);
        }

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        counter!(METRIC_MATERIALIZE_ROWS).increment(entities.len() as u64);
        histogram!(METRIC_MATERIALIZE_MS).record(elapsed_ms);
        debug!(rows = entities.len(), fields = plan.len(), elapsed_ms, "Materialized rows");

        Ok(entities)
    }

    /// Materialize every row of an in-memory table.
    pub fn materialize_rows<T: Entity>(&self, rows: &RowSet) -> Result<Vec<T>, DrainError> {
        self.materialize(&mut rows.cursor())
    }

    /// Validate and execute `query` on `connection`, then materialize the
    /// returned cursor.
    #[instrument(skip_all, fields(entity = T::entity_name(), kind = ?query.kind()))]
    pub fn query<T, Conn>(&self, connection: &mut Conn, query: &Query) -> Result<Vec<T>, DrainError>
    where
        T: Entity,
        Conn: Connection,
    {
        query.validate()?;
        let mut cursor = connection.execute(query)?;
        self.materialize(&mut cursor)
    }

    fn accessor_table<T: Entity>(
        &self,
        bindings: &[Binding<T>],
    ) -> Result<Arc<AccessorTable<T>>, DrainError> {
        let key = shape_key::<T>(bindings);
        if let Some(table) = self.store.get::<AccessorTable<T>>(&key, false) {
            debug!(key = %key, "Accessor table cache hit");
            return Ok(table);
        }

        let table = Arc::new(AccessorTable::build(
            key.clone(),
            &self.builder,
            bindings.iter().map(|binding| &binding.field),
        )?);
        counter!(METRIC_ACCESSOR_BUILD).increment(1);
        debug!(key = %key, fields = table.len(), "Built accessor table");

        match self.store.put_shared(key.clone(), Arc::clone(&table)) {
            Ok(()) => Ok(table),
            Err(DrainError::DuplicateKey { .. }) => {
                // Another caller published first; prefer its table so every
                // caller shares one instance.
                match self.store.get::<AccessorTable<T>>(&key, false) {
                    Some(winner) => Ok(winner),
                    None => {
                        warn!(key = %key, "Concurrent accessor table vanished, using local build");
                        Ok(table)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }
}

impl<B: AccessorBuilder + Default> Default for Materializer<B> {
    fn default() -> Self {
        Self::with_builder(Arc::new(ExpiringStore::default()), B::default())
    }
}

/// Pair every writable field with the first column matching its name.
fn bind_columns<T, C>(cursor: &C) -> Result<Vec<Binding<T>>, DrainError>
where
    T: Entity,
    C: RowCursor + ?Sized,
{
    let shape = T::shape();
    shape.validate()?;

    Ok(shape
        .fields()
        .iter()
        .filter(|field| field.is_writable())
        .filter_map(|field| {
            cursor.ordinal(field.name()).map(|ordinal| Binding {
                field: field.clone(),
                ordinal,
            })
        })
        .collect())
}

/// `"<type path>::[field,field,...]"` in declaration order.
///
/// Keyed by the Rust type path rather than `entity_name`, which callers may
/// share between types.
fn shape_key<T: Entity>(bindings: &[Binding<T>]) -> String {
    let names: Vec<&str> = bindings.iter().map(|binding| binding.field.name()).collect();
    format!("{}::[{}]", type_name::<T>(), names.join(","))
}

fn coerce_field<T: Entity>(field: &FieldDescriptor<T>, raw: &Value) -> Result<Value, CoercionError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let declared = field.declared();
    coerce(raw, declared).map_err(|reason| CoercionError {
        entity: T::entity_name(),
        field: field.name(),
        target: declared.to_string(),
        observed: raw.kind(),
        reason,
    })
}
