//! Integration test common infrastructure.
//!
//! Provides a scripted IRC server for the bot to connect to, plus
//! utilities for spawning corvid processes against it.

pub mod bot;
pub mod server;

#[allow(unused_imports)]
pub use bot::TestBot;
#[allow(unused_imports)]
pub use server::{TestServer, TestSession};
