pub mod store;
pub mod watch;

pub use store::{RegistryStore, Store};
