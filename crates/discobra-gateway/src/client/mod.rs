//! Client entry point and connection runner

mod client;
mod runner;

pub use client::{Client, ShutdownHandle};
