#![allow(dead_code)]

pub mod recording_progress;
pub mod scripted_store;
pub mod strategies;

pub use recording_progress::*;
pub use scripted_store::*;
