pub mod api;
pub mod classify;
pub mod common;
pub mod errors;
pub mod health;
pub mod output;
pub mod score;
pub mod session;
pub mod workflow;
