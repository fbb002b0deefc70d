mod download;
mod log_source;
mod subscribers;
mod watch;

pub use download::*;
pub use log_source::*;
pub use subscribers::*;
pub use watch::*;
