//! Shared UI components
//!
//! Reusable primitives like spinners and progress bars.

pub mod loading;
