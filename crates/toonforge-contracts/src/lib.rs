//! Records, registries and on-disk contracts shared by the toonforge engine
//! and CLI.

pub mod characters;
pub mod events;
pub mod models;
pub mod receipts;
pub mod records;
pub mod store;
