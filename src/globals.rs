pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of input variant records read from each genotype file in test mode
pub const TEST_VARIANT_LIMIT: usize = 10_000;
