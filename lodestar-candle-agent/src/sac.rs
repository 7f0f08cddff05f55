//! SAC agents.
//!
//! [`Sac`] trains the actor at every critic update against the target critics.
//! [`ModSac`] keeps a target actor and gates actor updates by the reliability
//! of the critic.
mod base;
mod config;
mod ent_coef;
mod mod_sac;
pub use base::Sac;
pub use config::{ModSacConfig, SacConfig};
pub use ent_coef::EntCoef;
pub(crate) use mod_sac::actor_turn;
pub use mod_sac::ModSac;
