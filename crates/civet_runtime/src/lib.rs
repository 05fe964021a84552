//! civet array runtime
//!
//! The associative-array value type of the civet runtime, the bespoke layout
//! lattice that lets specialized array representations replace the vanilla
//! one, and the logging/profiling pipeline that decides where doing so would
//! pay off.

pub mod arrays;
pub mod bespoke;
pub mod jit;
pub mod value;
pub mod vm;

pub use arrays::{ArrayData, ArrayKey, ArrayKind, ArrayRef};
pub use bespoke::{
    export_profiles, get_logging_profile, get_sink_profile, maybe_make_logging_array,
    wait_on_export_profiles, LayoutIndex,
};
pub use value::{DataType, SrcKey, TypedValue};
