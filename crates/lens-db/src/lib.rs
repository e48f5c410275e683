pub mod cache_repo;
pub mod schema;
pub mod task_repo;
pub mod util;

pub use crate::cache_repo::DbCache;
pub use crate::task_repo::DbTaskStore;
