//! Integration tests for the checker and persister pipeline

mod pipeline_tests;
