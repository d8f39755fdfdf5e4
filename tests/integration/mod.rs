// Integration test module organization

pub mod common;

mod cache_behavior_test;
mod encryption_test;
