pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
