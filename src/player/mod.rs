pub mod audio;
pub mod buffer;
pub mod controller;
pub mod engine;
pub mod events;
pub mod queue;
pub mod watchdog;
