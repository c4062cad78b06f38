//! kwdsl-storage: the process-wide global variable tier.
//!
//! [`FileStore`] keeps variables in a JSON document under the system temp
//! directory, guarded by a sibling lock file so concurrent test workers get
//! atomic read-modify-write cycles. [`MemoryStore`] is the in-process
//! variant. [`OnceMarker`] reuses the same locking for once-per-directory
//! setup and teardown.

mod error;
mod file;
mod lock;
mod memory;
mod once;
mod traits;

pub use error::StoreError;
pub use file::{default_dir, FileStore, DATA_FILE, DEFAULT_DIR_NAME, DIR_ENV, LOCK_FILE};
pub use lock::FileLock;
pub use memory::MemoryStore;
pub use once::OnceMarker;
pub use traits::GlobalStore;
