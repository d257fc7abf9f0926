//! Test Helper Utilities
//!
//! Shared utilities for testing mxa-analyzer

#![allow(dead_code)]

pub mod db_utils;
pub mod images;

pub use db_utils::{create_test_db, test_analyzer, test_config};
pub use images::{encode_png, gray_png, synthetic_face_png};
