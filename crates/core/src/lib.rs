//! Core types and utilities for the backrun bot
//!
//! This crate provides shared types used across all components:
//! - Mint, market and route definitions
//! - Quote and swap parameter types
//! - Backrunnable trades and arbitrage ideas
//! - Configuration and error types

pub mod types;
pub mod tokens;
pub mod markets;
pub mod quotes;
pub mod trades;
pub mod settings;
pub mod errors;

pub use types::*;
pub use tokens::*;
pub use markets::*;
pub use quotes::*;
pub use trades::*;
pub use settings::*;
pub use errors::*;

pub use alloy_primitives::{I256, U256};
