//! Packed event keys for the logging profile.
//!
//! Granularity matters here: too fine and the profiles blow up, too coarse
//! and the layout-selection pass loses the signal it needs. Keys and values
//! are recorded as small "spec" categories, with an inline payload only for
//! tiny integers and static strings.

use std::fmt;

use crate::value::{lookup, DataType, StringId, StringVal, TypedValue};

/// Operations observable on an array. One tag per logical operation; the
/// key spec in the event distinguishes int from string addressing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum ArrayOp {
    Scan = 0,
    HeapSize = 1,
    Size = 2,
    IsVectorData = 3,
    EscalateToVanilla = 4,
    ConvertToUncounted = 5,
    ReleaseUncounted = 6,
    Release = 7,
    Get = 8,
    GetKey = 9,
    GetVal = 10,
    GetPos = 11,
    IterBegin = 12,
    IterLast = 13,
    IterEnd = 14,
    IterAdvance = 15,
    IterRewind = 16,
    Lval = 17,
    Elem = 18,
    Set = 19,
    SetMove = 20,
    Remove = 21,
    Append = 22,
    AppendMove = 23,
    Pop = 24,
    PreSort = 25,
    PostSort = 26,
    SetLegacy = 27,
}

impl ArrayOp {
    const ALL: [ArrayOp; 28] = [
        ArrayOp::Scan,
        ArrayOp::HeapSize,
        ArrayOp::Size,
        ArrayOp::IsVectorData,
        ArrayOp::EscalateToVanilla,
        ArrayOp::ConvertToUncounted,
        ArrayOp::ReleaseUncounted,
        ArrayOp::Release,
        ArrayOp::Get,
        ArrayOp::GetKey,
        ArrayOp::GetVal,
        ArrayOp::GetPos,
        ArrayOp::IterBegin,
        ArrayOp::IterLast,
        ArrayOp::IterEnd,
        ArrayOp::IterAdvance,
        ArrayOp::IterRewind,
        ArrayOp::Lval,
        ArrayOp::Elem,
        ArrayOp::Set,
        ArrayOp::SetMove,
        ArrayOp::Remove,
        ArrayOp::Append,
        ArrayOp::AppendMove,
        ArrayOp::Pop,
        ArrayOp::PreSort,
        ArrayOp::PostSort,
        ArrayOp::SetLegacy,
    ];

    pub fn from_u8(raw: u8) -> Option<ArrayOp> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ArrayOp::Scan => "Scan",
            ArrayOp::HeapSize => "HeapSize",
            ArrayOp::Size => "Size",
            ArrayOp::IsVectorData => "IsVectorData",
            ArrayOp::EscalateToVanilla => "EscalateToVanilla",
            ArrayOp::ConvertToUncounted => "ConvertToUncounted",
            ArrayOp::ReleaseUncounted => "ReleaseUncounted",
            ArrayOp::Release => "Release",
            ArrayOp::Get => "Get",
            ArrayOp::GetKey => "GetKey",
            ArrayOp::GetVal => "GetVal",
            ArrayOp::GetPos => "GetPos",
            ArrayOp::IterBegin => "IterBegin",
            ArrayOp::IterLast => "IterLast",
            ArrayOp::IterEnd => "IterEnd",
            ArrayOp::IterAdvance => "IterAdvance",
            ArrayOp::IterRewind => "IterRewind",
            ArrayOp::Lval => "Lval",
            ArrayOp::Elem => "Elem",
            ArrayOp::Set => "Set",
            ArrayOp::SetMove => "SetMove",
            ArrayOp::Remove => "Remove",
            ArrayOp::Append => "Append",
            ArrayOp::AppendMove => "AppendMove",
            ArrayOp::Pop => "Pop",
            ArrayOp::PreSort => "PreSort",
            ArrayOp::PostSort => "PostSort",
            ArrayOp::SetLegacy => "SetLegacy",
        }
    }

    /// Partition used by the export report.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            ArrayOp::Scan
                | ArrayOp::HeapSize
                | ArrayOp::Size
                | ArrayOp::IsVectorData
                | ArrayOp::Get
                | ArrayOp::GetKey
                | ArrayOp::GetVal
                | ArrayOp::GetPos
                | ArrayOp::IterBegin
                | ArrayOp::IterLast
                | ArrayOp::IterEnd
                | ArrayOp::IterAdvance
                | ArrayOp::IterRewind
        )
    }
}

impl fmt::Display for ArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key/value categories. Strictly more specific than a datatype: integers
/// split by width, and `Str32` is a static string whose id fits 32 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
enum Spec {
    None = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Str32 = 5,
    Str = 6,
}

impl Spec {
    fn from_u8(raw: u8) -> Spec {
        match raw {
            1 => Spec::Int8,
            2 => Spec::Int16,
            3 => Spec::Int32,
            4 => Spec::Int64,
            5 => Spec::Str32,
            6 => Spec::Str,
            _ => Spec::None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Spec::None => "none",
            Spec::Int8 => "i8",
            Spec::Int16 => "i16",
            Spec::Int32 => "i32",
            Spec::Int64 => "i64",
            Spec::Str32 => "s32",
            Spec::Str => "str",
        }
    }

    fn of_int(k: i64) -> Spec {
        if i8::try_from(k).is_ok() {
            Spec::Int8
        } else if i16::try_from(k).is_ok() {
            Spec::Int16
        } else if i32::try_from(k).is_ok() {
            Spec::Int32
        } else {
            Spec::Int64
        }
    }

    fn of_str(s: &StringVal) -> Spec {
        if s.is_static() {
            Spec::Str32
        } else {
            Spec::Str
        }
    }

    fn of_value(v: &TypedValue) -> Spec {
        match v {
            TypedValue::Int(i) => Spec::of_int(*i),
            TypedValue::Str(s) => Spec::of_str(s),
            _ => Spec::None,
        }
    }
}

/// The key for one sampled event, packed into 64 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventKey {
    op: ArrayOp,
    key_spec: Spec,
    val_spec: Spec,
    val_type: DataType,
    /// Inline payload, set for `Spec::Int8` (biased by `-i8::MIN`) and
    /// `Spec::Str32` (the static string id) keys.
    key_payload: u32,
}

impl EventKey {
    pub fn new(op: ArrayOp) -> EventKey {
        EventKey {
            op,
            key_spec: Spec::None,
            val_spec: Spec::None,
            val_type: DataType::INVALID,
            key_payload: 0,
        }
    }

    pub fn with_int_key(op: ArrayOp, k: i64) -> EventKey {
        EventKey::new(op).set_int_key(k)
    }

    pub fn with_str_key(op: ArrayOp, k: &StringVal) -> EventKey {
        EventKey::new(op).set_str_key(k)
    }

    pub fn with_val(op: ArrayOp, v: &TypedValue) -> EventKey {
        EventKey::new(op).set_val(v)
    }

    pub fn with_int_key_val(op: ArrayOp, k: i64, v: &TypedValue) -> EventKey {
        EventKey::new(op).set_int_key(k).set_val(v)
    }

    pub fn with_str_key_val(op: ArrayOp, k: &StringVal, v: &TypedValue) -> EventKey {
        EventKey::new(op).set_str_key(k).set_val(v)
    }

    fn set_int_key(mut self, k: i64) -> EventKey {
        self.key_spec = Spec::of_int(k);
        if self.key_spec == Spec::Int8 {
            self.key_payload = (k - i8::MIN as i64) as u32;
        }
        self
    }

    fn set_str_key(mut self, k: &StringVal) -> EventKey {
        self.key_spec = Spec::of_str(k);
        if self.key_spec == Spec::Str32 {
            // Interned ids always fit the 32-bit payload.
            self.key_payload = k.static_id().map(StringId::raw).unwrap_or(0);
        }
        self
    }

    fn set_val(mut self, v: &TypedValue) -> EventKey {
        self.val_spec = Spec::of_value(v);
        self.val_type = v.datatype().modulo_persistence();
        self
    }

    pub fn op(&self) -> ArrayOp {
        self.op
    }

    pub fn to_bits(self) -> u64 {
        let payload = self.key_payload.to_le_bytes();
        u64::from_le_bytes([
            self.op as u8,
            self.key_spec as u8,
            self.val_spec as u8,
            self.val_type.raw(),
            payload[0],
            payload[1],
            payload[2],
            payload[3],
        ])
    }

    pub fn from_bits(bits: u64) -> EventKey {
        let bytes = bits.to_le_bytes();
        EventKey {
            op: ArrayOp::from_u8(bytes[0]).expect("invalid event key bits"),
            key_spec: Spec::from_u8(bytes[1]),
            val_spec: Spec::from_u8(bytes[2]),
            val_type: DataType::from_raw(bytes[3]),
            key_payload: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Human-readable form for the export report. Inverts the inline specs
    /// exactly; everything else renders at category granularity.
    pub fn render(&self) -> String {
        let key = match self.key_spec {
            Spec::None => String::new(),
            Spec::Int8 => {
                let k = self.key_payload as i64 + i8::MIN as i64;
                format!(" key=[i8:{k}]")
            }
            Spec::Str32 => match StringId::from_raw(self.key_payload) {
                Some(id) => format!(" key=[s32:\"{}\"]", lookup(id).escape_debug()),
                None => format!(" key=[{}]", Spec::Str32.name()),
            },
            spec => format!(" key=[{}]", spec.name()),
        };
        let val = if !self.val_type.is_valid() {
            String::new()
        } else if self.val_spec == Spec::None {
            format!(" val=[{}]", self.val_type.name())
        } else {
            format!(" val=[{}]", self.val_spec.name())
        };
        format!("{}{}{}", self.op.name(), key, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_int_key_renders_exactly() {
        for k in [-128i64, -1, 0, 5, 127] {
            let event = EventKey::with_int_key(ArrayOp::Get, k);
            assert_eq!(event.render(), format!("Get key=[i8:{k}]"));
        }
    }

    #[test]
    fn test_wide_int_key_renders_category() {
        let event = EventKey::with_int_key(ArrayOp::Get, 1 << 40);
        assert_eq!(event.render(), "Get key=[i64]");

        let event = EventKey::with_int_key(ArrayOp::Get, 1 << 20);
        assert_eq!(event.render(), "Get key=[i32]");

        let event = EventKey::with_int_key(ArrayOp::Get, 1000);
        assert_eq!(event.render(), "Get key=[i16]");
    }

    #[test]
    fn test_static_str_key_renders_contents() {
        let key = StringVal::new_static("name");
        let event = EventKey::with_str_key(ArrayOp::Get, &key);
        assert_eq!(event.render(), "Get key=[s32:\"name\"]");
    }

    #[test]
    fn test_counted_str_key_renders_category() {
        let key = StringVal::new_counted("name");
        let event = EventKey::with_str_key(ArrayOp::Remove, &key);
        assert_eq!(event.render(), "Remove key=[str]");
    }

    #[test]
    fn test_value_specs() {
        let event = EventKey::with_int_key_val(ArrayOp::Set, 3, &TypedValue::counted_str("v"));
        assert_eq!(event.render(), "Set key=[i8:3] val=[str]");

        let event = EventKey::with_val(ArrayOp::Append, &TypedValue::Dbl(1.5));
        assert_eq!(event.render(), "Append val=[Dbl]");
    }

    #[test]
    fn test_bits_round_trip() {
        let event = EventKey::with_int_key_val(ArrayOp::Set, 5, &TypedValue::Int(1 << 33));
        let back = EventKey::from_bits(event.to_bits());
        assert_eq!(back, event);
        assert_eq!(back.op(), ArrayOp::Set);
    }
}
