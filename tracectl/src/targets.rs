// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of tracing targets.
//!
//! Every crate declares the targets it logs to with [`trace_target!`]. The declarations are
//! gathered by `linkme` into [`TRACING_TARGETS`], so that [`crate::TracingControl`] knows about
//! all of them before any is used.

use crate::LevelFilter;
use linkme::distributed_slice;

/// A statically declared tracing target.
pub struct STarget {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}
impl STarget {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static TRACING_TARGETS: [STarget];

#[doc(hidden)]
#[macro_export]
macro_rules! trace_target_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{STarget, TRACING_TARGETS};
    };
}

/// Declare the calling module as a tracing target with a friendly name, default level and tags.
#[macro_export]
macro_rules! trace_target {
    // The anonymous const scope lets a crate invoke the macro in several modules without the
    // statics clashing.
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACING_TARGETS)]
            static TRACE_TGT: STarget = STarget::new(module_path!(), $name, $level, $tags);
        };
    };
}
