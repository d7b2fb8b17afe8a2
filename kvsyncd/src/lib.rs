pub mod control;
pub mod daemon;
pub mod state_lock;
pub mod sync;
