pub mod base;
pub mod config;
pub mod findif;
pub mod flags;
pub mod layout;
pub mod robocentric;
