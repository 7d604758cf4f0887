//! Persistence - the instance list file and the instance directories

mod instance_store;
mod list_store;

pub use instance_store::InstanceStore;
pub use list_store::ListStore;
