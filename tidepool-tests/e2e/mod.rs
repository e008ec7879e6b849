//! End-to-end tests for Tidepool
//!
//! Full runs of the conformance harness against seeded cassettes in
//! playback mode, with no network access.

#[path = "../support.rs"]
mod support;

mod alpha_playback;
mod replay;
