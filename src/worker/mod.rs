//! Admission-controlled worker — gate, processor, consumer loop, lifecycle.

pub mod consumer;
pub mod controller;
pub mod gate;
pub mod processor;

pub use consumer::ConsumerLoop;
pub use controller::{ControllerState, WorkerController};
pub use gate::{AdmissionGate, AdmissionPermit};
pub use processor::{ProcessorDeps, TaskProcessor};
