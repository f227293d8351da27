//! Utility functions for the application

pub mod glob;
pub mod mime;
pub mod string;
pub mod time;
