pub mod commands;
pub mod compression;
