//! Agents whose actor and critic are heads of one network.
//!
//! Each update step sums the objectives of both roles into one loss and
//! applies a single optimizer step. Parameters are saved under the critic
//! roles only.
mod ac;
mod config;
mod ppo;
mod sac;
pub use ac::SharedAc;
pub use config::{SharedAcConfig, SharedPpoConfig, SharedSacConfig};
pub use ppo::SharedPpo;
pub use sac::SharedSac;
