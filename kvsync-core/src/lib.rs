mod client;

pub use client::{KvClient, KvError};
