//! Per-array key/value type summaries.
//!
//! A summary only ever widens: observations move each lattice upward
//! (Empty -> precise -> Any) and never back down. The whole summary packs
//! into 16 bits so transition pairs can key a frequency map directly.

use std::fmt;

use super::datatype::DataType;

/// Summary of the key types an array has held.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum KeyTypes {
    Empty = 0,
    Ints = 1,
    StaticStrs = 2,
    Strs = 3,
    Any = 4,
}

impl KeyTypes {
    pub const COUNT: usize = 5;

    pub fn name(self) -> &'static str {
        match self {
            KeyTypes::Empty => "Empty",
            KeyTypes::Ints => "Ints",
            KeyTypes::StaticStrs => "StaticStrs",
            KeyTypes::Strs => "Strs",
            KeyTypes::Any => "Any",
        }
    }

    pub fn from_index(index: usize) -> Option<KeyTypes> {
        match index {
            0 => Some(KeyTypes::Empty),
            1 => Some(KeyTypes::Ints),
            2 => Some(KeyTypes::StaticStrs),
            3 => Some(KeyTypes::Strs),
            4 => Some(KeyTypes::Any),
            _ => None,
        }
    }
}

/// Summary of the value types an array has held.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ValueTypes {
    Empty = 0,
    Monotype = 1,
    Any = 2,
}

/// Combined entry-type state. `value_datatype` is meaningful only in the
/// `Monotype` state and is always persistence-stripped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntryTypes {
    pub key_types: KeyTypes,
    pub value_types: ValueTypes,
    pub value_datatype: DataType,
}

impl EntryTypes {
    pub fn empty() -> EntryTypes {
        EntryTypes {
            key_types: KeyTypes::Empty,
            value_types: ValueTypes::Empty,
            value_datatype: DataType::INVALID,
        }
    }

    pub fn observe_int_key(self) -> EntryTypes {
        let key_types = match self.key_types {
            KeyTypes::Empty | KeyTypes::Ints => KeyTypes::Ints,
            _ => KeyTypes::Any,
        };
        EntryTypes { key_types, ..self }
    }

    pub fn observe_str_key(self, is_static: bool) -> EntryTypes {
        let key_types = match (self.key_types, is_static) {
            (KeyTypes::Empty, true) => KeyTypes::StaticStrs,
            (KeyTypes::Empty, false) => KeyTypes::Strs,
            (KeyTypes::StaticStrs, true) => KeyTypes::StaticStrs,
            (KeyTypes::StaticStrs, false) => KeyTypes::Strs,
            (KeyTypes::Strs, _) => KeyTypes::Strs,
            _ => KeyTypes::Any,
        };
        EntryTypes { key_types, ..self }
    }

    pub fn observe_value(self, dt: DataType) -> EntryTypes {
        let dt = dt.modulo_persistence();
        let (value_types, value_datatype) = match self.value_types {
            ValueTypes::Empty => (ValueTypes::Monotype, dt),
            ValueTypes::Monotype if self.value_datatype == dt => (ValueTypes::Monotype, dt),
            _ => (ValueTypes::Any, DataType::INVALID),
        };
        EntryTypes {
            value_types,
            value_datatype,
            ..self
        }
    }

    pub fn as_u16(self) -> u16 {
        let low = self.key_types as u16 | ((self.value_types as u16) << 4);
        let high = self.value_datatype.raw() as u16;
        low | (high << 8)
    }

    pub fn from_u16(bits: u16) -> EntryTypes {
        let key_types = KeyTypes::from_index((bits & 0xf) as usize).unwrap_or(KeyTypes::Any);
        let value_types = match (bits >> 4) & 0xf {
            0 => ValueTypes::Empty,
            1 => ValueTypes::Monotype,
            _ => ValueTypes::Any,
        };
        EntryTypes {
            key_types,
            value_types,
            value_datatype: DataType::from_raw((bits >> 8) as u8),
        }
    }
}

impl fmt::Display for EntryTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_types {
            ValueTypes::Empty => write!(f, "{}:Empty", self.key_types.name()),
            ValueTypes::Monotype => {
                write!(f, "{}:Monotype({})", self.key_types.name(), self.value_datatype)
            }
            ValueTypes::Any => write!(f, "{}:Any", self.key_types.name()),
        }
    }
}
