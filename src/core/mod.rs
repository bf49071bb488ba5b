//! Core application primitives (service, scheduler, workers, HTTP)

pub mod http;
pub mod runtime;
pub mod scheduler;
pub mod service;

pub use http::*;
pub use runtime::*;
pub use scheduler::*;
pub use service::*;
