//! Utility functions and helpers for the saim-fit library.

pub mod finite_difference;
