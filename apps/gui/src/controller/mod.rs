//! Controller layer: backend events for the UI and command dispatch.

pub mod events;
pub mod orchestration;
