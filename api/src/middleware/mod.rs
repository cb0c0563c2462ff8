pub mod cors;
pub mod defense;
pub mod rate_limit;
