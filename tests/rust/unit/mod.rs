//! Unit tests - exercise the public API without any database
//!
//! Shared fixtures live in `tests/fixtures`.

mod feature_lock_tests;
mod property_translation_tests;
