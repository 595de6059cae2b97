mod params;
mod registry;
mod selectors;

pub use params::{default_value, resolve_params};
pub use registry::{
    MethodRegistry, MethodSpec, ParamKind, ParamSpec, ASPECT_RATIOS, DEFAULT_METHOD,
};
pub use selectors::{MethodSelection, MethodSelector};
