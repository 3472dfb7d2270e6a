#![forbid(unsafe_code)]

pub mod artifacts;
pub mod assemble;
pub mod book;
pub mod cli;
pub mod commands;
pub mod config;
pub mod convert;
pub mod error;
pub mod lint;
pub mod locate;
pub mod logging;
pub mod orchestrate;
pub mod validate;
pub mod workspace;
