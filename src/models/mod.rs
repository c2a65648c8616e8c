pub mod food;
pub mod user;
