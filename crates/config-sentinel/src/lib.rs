pub mod backups;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fs;
pub mod gate;
pub mod guard;
pub mod logging;
pub mod migrate;
pub mod parse;
pub mod recovery;
pub mod settings;
pub mod write;

pub use error::{Error, Result};
