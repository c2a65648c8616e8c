pub mod food;
pub mod pool;
pub mod user;

pub use pool::{create_pool, run_migrations, DbConfig};
