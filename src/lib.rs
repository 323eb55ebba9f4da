pub mod action;
pub mod command;
pub mod config;
pub mod deps;
pub mod kernel;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod release;
pub mod source;
pub mod store;
pub mod toolchain;
