//! Mock tag source and text fixtures shared by the tagger scenario tests.

#![allow(dead_code)]

pub mod mock_source;
pub mod test_fixtures;
