//! Query shapes: fixed statement text plus a fixed parameter list.

use crate::error::{Error, Result};
use crate::value::{ParamType, Value};

/// A declared parameter slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamSlot {
    /// Parameter name as it appears in the statement (e.g. `@id`).
    pub name: String,
    /// Declared type.
    pub ty: ParamType,
}

impl ParamSlot {
    /// Declare a slot.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// The shape of a non-reading statement.
///
/// Two shapes are equal only if both the text and the ordered slot list are
/// equal, which makes a shape usable as the key of a command cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryShape {
    sql: String,
    params: Vec<ParamSlot>,
}

impl QueryShape {
    /// Create a shape from statement text with no parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Declare another parameter slot.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSlot::new(name, ty));
        self
    }

    /// Get the statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the declared slots, in binding order.
    #[must_use]
    pub fn params(&self) -> &[ParamSlot] {
        &self.params
    }

    /// Check that `values` can be bound into this shape's slots.
    ///
    /// NULL binds to any slot.
    pub fn check(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.params.len() {
            return Err(Error::ParameterCount {
                expected: self.params.len(),
                actual: values.len(),
            });
        }

        for (slot, value) in self.params.iter().zip(values) {
            if let Some(actual) = value.param_type() {
                if actual != slot.ty {
                    return Err(Error::ParameterType {
                        name: slot.name.clone(),
                        expected: slot.ty,
                        actual,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_shape() -> QueryShape {
        QueryShape::new("INSERT INTO items (id, name) VALUES (@id, @name)")
            .param("@id", ParamType::Int)
            .param("@name", ParamType::Text)
    }

    #[test]
    fn test_check_accepts_matching_values() {
        let shape = insert_shape();
        assert!(shape.check(&[Value::from(1), Value::from("sword")]).is_ok());
        assert!(shape.check(&[Value::from(1), Value::Null]).is_ok());
    }

    #[test]
    fn test_check_rejects_count_mismatch() {
        let err = insert_shape().check(&[Value::from(1)]).unwrap_err();
        assert!(matches!(
            err,
            Error::ParameterCount {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_check_rejects_type_mismatch() {
        let err = insert_shape()
            .check(&[Value::from("1"), Value::from("sword")])
            .unwrap_err();
        assert!(matches!(err, Error::ParameterType { ref name, .. } if name == "@id"));
    }

    #[test]
    fn test_shape_identity_includes_params() {
        let a = QueryShape::new("DELETE FROM items WHERE id = @id").param("@id", ParamType::Int);
        let b = QueryShape::new("DELETE FROM items WHERE id = @id").param("@id", ParamType::Text);
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
