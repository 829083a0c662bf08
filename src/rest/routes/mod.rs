//! Route handlers for the trigger API.

pub mod debug;
pub mod health;
pub mod run;
