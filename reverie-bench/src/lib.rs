//! Benchmark-only crate; see `benches/cognition.rs` for the suite.
