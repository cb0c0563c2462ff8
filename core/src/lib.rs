//! Domain types shared by the Bastion API and CLI.
//!
//! Everything in this crate is pure: no I/O, no clocks read behind the caller's back.

pub mod bans;
pub mod error;
pub mod fallback;
pub mod features;
pub mod requests;
