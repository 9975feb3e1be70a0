#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for sluice.
//!
//! Pure helpers with no logging dependency; the CLI owns tracing setup.

pub mod fs;
pub mod hash;
