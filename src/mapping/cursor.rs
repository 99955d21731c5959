//! Forward-only row sources.

use super::value::{Value, ValueKind};
use crate::error::DrainError;

/// Column metadata exposed by a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// `Other` accepts values of any kind.
    pub kind: ValueKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Other)
    }
}

/// Forward-only cursor over a tabular result.
pub trait RowCursor {
    fn columns(&self) -> &[Column];

    /// Move to the next row; `false` once the source is exhausted.
    fn advance(&mut self) -> Result<bool, DrainError>;

    /// Value at `ordinal` in the current row.
    fn value(&self, ordinal: usize) -> Option<&Value>;

    /// First column whose name matches `name` ignoring case.
    fn ordinal(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        self.columns()
            .iter()
            .position(|column| column.name.to_lowercase() == wanted)
    }
}

impl<C: RowCursor + ?Sized> RowCursor for &mut C {
    fn columns(&self) -> &[Column] {
        (**self).columns()
    }

    fn advance(&mut self) -> Result<bool, DrainError> {
        (**self).advance()
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        (**self).value(ordinal)
    }

    fn ordinal(&self, name: &str) -> Option<usize> {
        (**self).ordinal(name)
    }
}

impl<C: RowCursor + ?Sized> RowCursor for Box<C> {
    fn columns(&self) -> &[Column] {
        (**self).columns()
    }

    fn advance(&mut self) -> Result<bool, DrainError> {
        (**self).advance()
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        (**self).value(ordinal)
    }

    fn ordinal(&self, name: &str) -> Option<usize> {
        (**self).ordinal(name)
    }
}

/// In-memory table of rows sharing one column layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, checking arity and column kinds. Null fits any column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<&mut Self, DrainError> {
        if row.len() != self.columns.len() {
            return Err(DrainError::argument_invalid(
                "row",
                format!("expected {} values, got {}", self.columns.len(), row.len()),
            ));
        }
        for (column, value) in self.columns.iter().zip(&row) {
            let kind = value.kind();
            if kind != ValueKind::Null && column.kind != ValueKind::Other && column.kind != kind {
                return Err(DrainError::argument_invalid(
                    "row",
                    format!("column `{}` holds {} values, got {kind}", column.name, column.kind),
                ));
            }
        }
        self.rows.push(row);
        Ok(self)
    }

    /// Builder-style [`push_row`](Self::push_row).
    pub fn with_row(mut self, row: Vec<Value>) -> Result<Self, DrainError> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cursor(&self) -> RowSetCursor<'_> {
        RowSetCursor {
            set: self,
            position: None,
        }
    }
}

/// Cursor over a borrowed [`RowSet`].
#[derive(Debug, Clone)]
pub struct RowSetCursor<'a> {
    set: &'a RowSet,
    position: Option<usize>,
}

impl RowCursor for RowSetCursor<'_> {
    fn columns(&self) -> &[Column] {
        &self.set.columns
    }

    fn advance(&mut self) -> Result<bool, DrainError> {
        let next = self.position.map_or(0, |position| position + 1);
        if next < self.set.rows.len() {
            self.position = Some(next);
            Ok(true)
        } else {
            self.position = Some(self.set.rows.len());
            Ok(false)
        }
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.set.rows.get(self.position?)?.get(ordinal)
    }
}
