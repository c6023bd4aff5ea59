//! HTTP trigger: one tolerant polling batch per `POST /`, skipped while the API asks to wait.

#[macro_use]
extern crate tracing;

pub mod error;
pub mod response;
pub mod router;
