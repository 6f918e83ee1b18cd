//! Utilities module aggregator. `test` holds the scripted doubles shared by
//! unit and integration tests.

pub mod test;
