//! Core value model: datatypes, typed values, interned strings, source keys,
//! and the per-array entry-type summaries the profiler tracks.

pub mod datatype;
pub mod entry_types;
pub mod srckey;
pub mod string;
pub mod typed;

pub use datatype::DataType;
pub use entry_types::{EntryTypes, KeyTypes, ValueTypes};
pub use srckey::{register_func, FuncId, OpCode, ResumeMode, SrcKey};
pub use string::{intern, lookup, StringId, StringVal};
pub use typed::TypedValue;
