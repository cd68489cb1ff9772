//! Server bootstrap split from main.rs for better organization

mod health;
mod server;
mod shutdown;

pub use health::*;
pub use server::*;
pub use shutdown::*;
