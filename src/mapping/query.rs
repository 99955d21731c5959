//! Query descriptions handed to a connection.

use super::cursor::RowCursor;
use super::value::Value;
use crate::error::DrainError;

/// How the command text is interpreted by the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

/// Command text, kind and named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    kind: CommandKind,
    parameters: Vec<Parameter>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
        }
    }

    pub fn stored_procedure(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(CommandKind::StoredProcedure)
    }

    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Reject blank command text, blank parameter names and parameter names
    /// repeated ignoring case.
    pub fn validate(&self) -> Result<(), DrainError> {
        if self.text.trim().is_empty() {
            return Err(DrainError::argument_invalid("query", "command text must not be blank"));
        }
        for (index, parameter) in self.parameters.iter().enumerate() {
            if parameter.name.trim().is_empty() {
                return Err(DrainError::argument_invalid(
                    "parameter",
                    format!("parameter #{index} has a blank name"),
                ));
            }
            let duplicate = self.parameters[..index]
                .iter()
                .any(|earlier| earlier.name.eq_ignore_ascii_case(&parameter.name));
            if duplicate {
                return Err(DrainError::argument_invalid(
                    "parameter",
                    format!("parameter `{}` is bound twice", parameter.name),
                ));
            }
        }
        Ok(())
    }
}

/// A data source able to run a [`Query`] and hand back a row cursor.
pub trait Connection {
    type Cursor<'c>: RowCursor
    where
        Self: 'c;

    fn execute(&mut self, query: &Query) -> Result<Self::Cursor<'_>, DrainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_parameters_in_order() {
        let query = Query::stored_procedure("list_articles")
            .bind("status", "Live")
            .bind("limit", 10_i64);

        assert_eq!(query.kind(), CommandKind::StoredProcedure);
        assert_eq!(query.text(), "list_articles");
        let names: Vec<&str> = query.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["status", "limit"]);
        query.validate().expect("valid");
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(matches!(
            Query::new("   ").validate(),
            Err(DrainError::ArgumentInvalid { name: "query", .. })
        ));
    }

    #[test]
    fn blank_or_repeated_parameter_names_are_rejected() {
        let blank = Query::new("select 1").bind(" ", 1_i64);
        assert!(matches!(
            blank.validate(),
            Err(DrainError::ArgumentInvalid { name: "parameter", .. })
        ));

        let repeated = Query::new("select 1").bind("id", 1_i64).bind("ID", 2_i64);
        assert!(repeated.validate().is_err());
    }
}
