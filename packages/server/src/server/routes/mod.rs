// HTTP routes
pub mod health;
pub mod submissions;

pub use health::*;
pub use submissions::*;
