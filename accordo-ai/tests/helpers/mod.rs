//! Test helper utilities
//!
//! Shared fixtures and fakes for accordo-ai integration tests

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;
pub mod fixtures;

pub use db_utils::create_test_store;
