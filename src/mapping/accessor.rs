//! Assignment callables built once per entity shape.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::shape::{Entity, FieldDescriptor};
use super::value::Value;
use crate::error::{CoercionError, DrainError};

/// Writes a coerced value into one field of an entity.
pub type Assigner<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), CoercionError> + Send + Sync>;

/// Produces assigners for writable fields.
pub trait AccessorBuilder: Send + Sync {
    /// Fails with `UnsupportedField` when the field has no setter.
    fn build<T: Entity>(&self, field: &FieldDescriptor<T>) -> Result<Assigner<T>, DrainError>;
}

/// Builds assigners from the setters registered in the entity shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetterBuilder;

impl AccessorBuilder for SetterBuilder {
    fn build<T: Entity>(&self, field: &FieldDescriptor<T>) -> Result<Assigner<T>, DrainError> {
        let Some(setter) = field.setter() else {
            return Err(DrainError::unsupported_field(T::entity_name(), field.name()));
        };
        let setter = Arc::clone(setter);
        let name = field.name();
        let declared = field.declared();

        Ok(Arc::new(move |target: &mut T, value: Value| {
            setter(target, value).map_err(|rejected| CoercionError {
                entity: T::entity_name(),
                field: name,
                target: declared.to_string(),
                observed: rejected.kind(),
                reason: "value does not fit the field".to_string(),
            })
        }))
    }
}

impl<B: AccessorBuilder> AccessorBuilder for Arc<B> {
    fn build<T: Entity>(&self, field: &FieldDescriptor<T>) -> Result<Assigner<T>, DrainError> {
        (**self).build(field)
    }
}

/// Field name to assigner map for one entity shape.
pub struct AccessorTable<T> {
    key: String,
    assigners: HashMap<&'static str, Assigner<T>>,
}

impl<T: Entity> AccessorTable<T> {
    /// Build assigners for every field, failing on the first unsupported one.
    pub fn build<'f, B, I>(key: String, builder: &B, fields: I) -> Result<Self, DrainError>
    where
        B: AccessorBuilder,
        I: IntoIterator<Item = &'f FieldDescriptor<T>>,
    {
        let assigners = fields
            .into_iter()
            .map(|field| Ok((field.name(), builder.build(field)?)))
            .collect::<Result<HashMap<_, _>, DrainError>>()?;
        Ok(Self { key, assigners })
    }
}

impl<T> AccessorTable<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, field: &str) -> Option<&Assigner<T>> {
        self.assigners.get(field)
    }

    pub fn len(&self) -> usize {
        self.assigners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigners.is_empty()
    }

    /// Field names in sorted order.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.assigners.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<T> fmt::Debug for AccessorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorTable")
            .field("key", &self.key)
            .field("fields", &self.fields())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::shape::EntityShape;
    use crate::mapping::value::ValueKind;

    #[derive(Debug, Default)]
    struct Account {
        id: i64,
        owner: String,
    }

    impl Entity for Account {
        fn entity_name() -> &'static str {
            "Account"
        }

        fn shape() -> EntityShape<Self> {
            EntityShape::new()
                .field("id", |a: &mut Account, v: i64| a.id = v)
                .field("owner", |a: &mut Account, v: String| a.owner = v)
                .read_only::<String>("display")
        }
    }

    #[test]
    fn assigner_writes_through_setter() {
        let shape = Account::shape();
        let assign = SetterBuilder.build(&shape.fields()[1]).expect("writable");

        let mut account = Account::default();
        assign(&mut account, Value::Text("ada".into())).expect("assign");
        assert_eq!(account.owner, "ada");
    }

    #[test]
    fn read_only_field_is_unsupported() {
        let shape = Account::shape();
        let err = SetterBuilder.build(&shape.fields()[2]).err().expect("read-only");

        assert!(matches!(
            err,
            DrainError::UnsupportedField {
                entity: "Account",
                field: "display"
            }
        ));
    }

    #[test]
    fn mismatched_value_reports_field_context() {
        let shape = Account::shape();
        let assign = SetterBuilder.build(&shape.fields()[0]).expect("writable");

        let err = assign(&mut Account::default(), Value::Text("7".into())).unwrap_err();
        assert_eq!(err.field, "id");
        assert_eq!(err.target, "i64");
        assert_eq!(err.observed, ValueKind::Text);
    }

    #[test]
    fn table_build_stops_at_first_unsupported_field() {
        let shape = Account::shape();
        let err = AccessorTable::build("k".to_string(), &SetterBuilder, shape.fields()).unwrap_err();
        assert!(matches!(err, DrainError::UnsupportedField { field: "display", .. }));

        let table = AccessorTable::build("k".to_string(), &SetterBuilder, &shape.fields()[..2])
            .expect("writable fields");
        assert_eq!(table.fields(), vec!["id", "owner"]);
        assert_eq!(table.key(), "k");
    }
}
