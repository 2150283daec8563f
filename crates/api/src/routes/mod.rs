//! REST read endpoints

pub mod observations;
pub mod stations;
pub mod status;
