//! Session root (C10 Handler half): wires C2-C9 together and owns the
//! session lifecycle, grounded on `Handler.h`.

pub mod handler;

pub use handler::{Handler, HandlerConfig};
