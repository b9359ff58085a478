//! # Pipeline Module
//!
//! Method registry and per-request executor.
//!
//! Methods come in three kinds. `prereq` methods run first, only when
//! something in the request requires them. `option` methods run in the
//! order the client listed them. Exactly one `terminal` runs last and
//! produces the request's patches.

mod executor;
mod method;
mod params;
mod registry;

pub use executor::PipelineExecutor;
pub use method::{
    Method, MethodDescriptor, MethodKind, OptionHandler, PrereqHandler, RequestScope,
    TerminalHandler,
};
pub use params::{Param, Params};
pub use registry::{MethodRegistry, Plugin, PluginContext};
