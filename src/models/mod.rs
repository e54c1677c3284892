// Atomic model modules
pub mod instance;
pub mod region;

pub use instance::{Instance, InstanceAction, InstanceState, Overlay, TargetState};
pub use region::Region;
