mod access;
mod dialect;
mod message;
mod reflector;
mod relay;
mod table;
mod timestamp;
mod types;

pub use access::*;
pub use dialect::*;
pub use message::*;
pub use reflector::*;
pub use relay::*;
pub use table::*;
pub use timestamp::*;
pub use types::*;
