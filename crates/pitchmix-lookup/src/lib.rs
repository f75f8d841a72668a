// Library root for the matchup lookup: artifact discovery and loading, plus
// the query itself, so the binary and integration tests share one API.

pub mod artifact;
pub mod query;
