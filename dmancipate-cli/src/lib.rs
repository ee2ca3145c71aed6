pub mod cli;
pub mod client;

pub use cli::{Args, CliAction};
pub use client::{ClientError, DmClient};
