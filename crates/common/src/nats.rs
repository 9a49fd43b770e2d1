mod broadcast_sink;
mod client;
mod trace_context;
mod traits;

pub use broadcast_sink::*;
pub use client::*;
pub use trace_context::*;
pub use traits::*;
