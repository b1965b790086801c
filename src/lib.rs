pub mod commands;
pub mod config;
pub mod error;
pub mod id_map;
pub mod library_parser;
pub mod library_writer;
pub mod logging;
pub mod models;
pub mod scanner;
pub mod source_watcher;
pub mod sync_engine;
pub mod usb_sync;

pub use error::{AnyResult, RekordsyncError};
