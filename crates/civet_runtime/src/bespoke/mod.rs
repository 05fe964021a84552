//! Bespoke array layouts and the logging/profiling pipeline.
//!
//! Submodules: the layout lattice ([`layout`]), the runtime operation
//! vtable ([`vtable`]), the logging shim ([`logging_array`]), packed event
//! keys ([`event_key`]), the source and sink profile tables
//! ([`logging_profile`], [`sink_profile`]), and export ([`export`]).

pub mod event_key;
pub mod export;
pub mod layout;
pub mod logging_array;
pub mod logging_profile;
pub mod sink_profile;
pub mod vtable;

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::arrays::ArrayData;

pub use event_key::{ArrayOp, EventKey};
pub use export::{export_profiles, wait_on_export_profiles};
pub use layout::{
    block_matches, finalize_hierarchy, from_concrete_index, from_index, hierarchy_finalized,
    layout_join, layout_le, layout_meet, liveable_ancestor, register_layout, reserve_indices,
    Layout, LayoutHierarchy, LayoutIndex, TopLayout, EXTRA_BESPOKE_BIT,
};
pub use logging_array::{maybe_make_logging_array, LoggingArray, LoggingLayout};
pub use logging_profile::{get_logging_profile, peek_logging_profile, LoggingProfile};
pub use sink_profile::{get_sink_profile, SinkKey, SinkProfile, TransId};
pub use vtable::{log_bespoke_dispatch, BespokeArrayImpl, LayoutFunctions};

struct CoreLayouts {
    top: LayoutIndex,
    logging: LayoutIndex,
}

// Registered on first touch of the bespoke subsystem, before anything else
// can reserve indices.
static CORE: Lazy<CoreLayouts> = Lazy::new(|| {
    let top = layout::reserve_indices(1);
    layout::register_layout(Arc::new(TopLayout::new(top)), &[]);
    let logging = layout::reserve_indices(1);
    layout::register_layout(Arc::new(LoggingLayout::new(logging)), &[top]);
    CoreLayouts { top, logging }
});

pub(crate) fn ensure_core_layouts() {
    Lazy::force(&CORE);
}

pub fn top_layout_index() -> LayoutIndex {
    CORE.top
}

pub fn logging_layout_index() -> LayoutIndex {
    CORE.logging
}

/// The operation vtable of the (concrete) layout owning `ad`.
pub(crate) fn vtable_for(ad: &ArrayData) -> &'static LayoutFunctions {
    let index = ad
        .layout_index()
        .expect("vanilla array routed to bespoke dispatch");
    let layout = layout::from_concrete_index(index);
    layout.vtable().expect("concrete layout without a vtable")
}
