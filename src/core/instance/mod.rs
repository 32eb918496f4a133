mod layout;
mod lock;

pub use layout::InstanceLayout;
pub use lock::{FileLock, VersionGuard, VersionLocks};
