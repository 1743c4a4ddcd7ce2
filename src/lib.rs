//! ShipAbility: marketplace order exports to shipping labels.

pub mod config;
pub mod error;
pub mod export;
pub mod labels;
pub mod orders;
pub mod rules;
pub mod session;
