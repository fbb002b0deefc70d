mod bootstrap;
mod dispatch;
mod updater;

pub use bootstrap::*;
pub use dispatch::*;
pub use updater::*;
