// src/deploy/mod.rs

//! Deploy process supervision on the server.

pub mod process;
pub mod supervisor;

pub use process::{DeployHandle, shell_command};
pub use supervisor::DeploySupervisor;
