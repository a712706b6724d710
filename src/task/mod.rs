//! Task records: the unit of work that moves through the queue.
//!
//! # Lifecycle
//! ```text
//! TaskPool::acquire → prepare (id, request, created_at)
//!     → queue → worker attempt → (requeue | finished)
//!     → reset → TaskPool::release
//! ```

pub mod id;
pub mod pool;
pub mod record;
pub mod report;

pub use id::generate_id;
pub use pool::TaskPool;
pub use record::TaskRecord;
pub use report::TaskReport;
