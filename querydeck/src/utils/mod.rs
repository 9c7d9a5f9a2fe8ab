//! Utility functions shared by the data layer

pub mod sql;
pub mod time;
