pub mod assignments;
pub mod config;
pub mod data;
pub mod prepare;
pub mod render;
pub mod server;
pub mod sets;
pub mod types;
pub mod viewer;
