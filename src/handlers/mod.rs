pub mod auth;
pub mod food;
pub mod health;
pub mod user;
pub mod webhook;
