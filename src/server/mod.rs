pub mod node;
mod router;
mod server;
pub mod settings;

pub use router::*;
pub use server::*;
pub use settings::*;
