//! Unit tests for the status-change queue.

mod memory_queue_tests;
