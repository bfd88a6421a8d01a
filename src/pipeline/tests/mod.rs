//! Unit tests for the relay, the sweeper, the scheduler, and the workers.

mod schedule_tests;
