use std::fmt;
use std::sync::Arc;

use crate::arrays::ArrayRef;

use super::datatype::DataType;
use super::string::StringVal;

/// A runtime value cell.
#[derive(Clone)]
pub enum TypedValue {
    Uninit,
    Null,
    Bool(bool),
    Int(i64),
    Dbl(f64),
    Str(StringVal),
    Arr(ArrayRef),
}

impl TypedValue {
    pub fn datatype(&self) -> DataType {
        match self {
            TypedValue::Uninit => DataType::UNINIT,
            TypedValue::Null => DataType::NULL,
            TypedValue::Bool(_) => DataType::BOOL,
            TypedValue::Int(_) => DataType::INT,
            TypedValue::Dbl(_) => DataType::DBL,
            TypedValue::Str(s) => {
                if s.is_static() {
                    DataType::PERSISTENT_STR
                } else {
                    DataType::STR
                }
            }
            TypedValue::Arr(_) => DataType::ARR,
        }
    }

    pub fn is_uninit(&self) -> bool {
        matches!(self, TypedValue::Uninit)
    }

    pub fn static_str(text: &str) -> TypedValue {
        TypedValue::Str(StringVal::new_static(text))
    }

    pub fn counted_str(text: &str) -> TypedValue {
        TypedValue::Str(StringVal::new_counted(text))
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypedValue::Uninit, TypedValue::Uninit) => true,
            (TypedValue::Null, TypedValue::Null) => true,
            (TypedValue::Bool(a), TypedValue::Bool(b)) => a == b,
            (TypedValue::Int(a), TypedValue::Int(b)) => a == b,
            (TypedValue::Dbl(a), TypedValue::Dbl(b)) => a == b,
            (TypedValue::Str(a), TypedValue::Str(b)) => a == b,
            (TypedValue::Arr(a), TypedValue::Arr(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Uninit => write!(f, "uninit"),
            TypedValue::Null => write!(f, "null"),
            TypedValue::Bool(b) => write!(f, "{b}"),
            TypedValue::Int(i) => write!(f, "{i}"),
            TypedValue::Dbl(d) => write!(f, "{d}"),
            TypedValue::Str(s) => write!(f, "{:?}", s.as_str()),
            TypedValue::Arr(a) => write!(f, "array({} entries)", a.size()),
        }
    }
}
