pub mod app;
pub mod audio;
pub mod commands;
pub mod config;
