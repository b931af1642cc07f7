//! Scenario arbitration: which logical module owns the mixer, and what
//! volume/routing it programs.

mod engine;
mod module;
#[allow(clippy::module_inception)]
mod scenario;

pub use engine::{ModuleHooks, ScenarioEngine};
pub use module::ScenarioModule;
pub use scenario::{Priority, RingerMode, RouteEntry, Scenario};
