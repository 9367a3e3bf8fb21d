pub mod comms;
pub mod memory;
pub mod relay;
pub mod runtime;
