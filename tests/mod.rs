//! Test suite for StudySync
//!
//! This module organizes all tests

pub mod common;
pub mod integration;
