//! Domain models shared by the engine, the store and the API.

pub mod session;
pub mod state;
pub mod task;
