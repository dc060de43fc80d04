// ABOUTME: Configuration constants shared across MarketWise packages
// ABOUTME: Environment variable names and their default values

pub mod constants;

pub use constants::*;
