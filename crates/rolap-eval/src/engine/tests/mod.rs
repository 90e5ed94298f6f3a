mod access;
pub mod common;
mod concurrency;
mod grid;
mod visual_totals;
