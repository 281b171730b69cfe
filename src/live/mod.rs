//! Live copilot core: realtime client, turn gating, transcript history,
//! control surface, and the session controller tying them together.

pub mod client;
pub mod controls;
pub mod gating;
pub mod history;
pub mod session;
