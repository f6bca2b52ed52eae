use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within knot.
///
/// Node-related variants carry `node`, the rendered identity of the variable
/// involved (see [`Variable`](crate::Variable)'s `Display`), so every message
/// says which point of the graph failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value's element type differs from the variable's declared data type.
    #[error("data type of the value ({got}) does not match the data type of variable {node} ({expected})")]
    TypeMismatch {
        node: String,
        expected: DType,
        got: DType,
    },

    /// A dynamic axis appears more than once in a variable's axis list.
    #[error("dynamic axis named '{axis}' is specified more than once for variable {node}")]
    DuplicateAxis { axis: String, node: String },

    /// Output variables are derived from their position in the graph.
    #[error("output variable {node} cannot be cloned")]
    NotCloneable { node: String },

    /// A deferred initializer was attached to a variable that already has
    /// a value or a pending initializer.
    #[error("variable {node} already has a value or a pending initializer")]
    AlreadyInitialized { node: String },

    /// The value was requested but nothing bound or armed one.
    #[error("variable {node} has no value and no deferred initializer")]
    UninitializedValue { node: String },

    /// A value's shape differs from the variable's (concrete) shape.
    #[error("shape of the value {got} does not match the shape of variable {node} (expected {expected})")]
    ShapeMismatch {
        node: String,
        expected: Shape,
        got: Shape,
    },

    /// The operation is not defined for this kind of variable.
    #[error("operation not supported on {kind} variable {node}")]
    InvalidKind { node: String, kind: String },

    /// Element count mismatch when creating a value from a slice.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Storage can only be allocated for shapes without free or inferred dims.
    #[error("shape {shape} has free or inferred dimensions")]
    NotConcrete { shape: Shape },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout knot.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted [`Error::Msg`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_embed_node() {
        let e = Error::DuplicateAxis {
            axis: "time".into(),
            node: "Input('x', [3], [time, time])".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'time'"));
        assert!(msg.contains("Input('x'"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let e = Error::TypeMismatch {
            node: "Constant('c', [], [])".into(),
            expected: DType::F32,
            got: DType::F64,
        };
        assert_eq!(
            e.to_string(),
            "data type of the value (f64) does not match the data type of variable Constant('c', [], []) (f32)"
        );
    }
}
