// follow-tracker: follower/following history for an Instagram account
//
// This is the library root. Each module corresponds to a major subsystem
// of the refresh pipeline.

pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod instagram;
pub mod output;
pub mod pipeline;
pub mod status;
