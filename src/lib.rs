mod error;
pub mod jobs;
pub mod paths;
pub mod store;
pub mod ytdlp;

pub use error::{ArchiverError, Result};
