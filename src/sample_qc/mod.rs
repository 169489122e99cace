//! Sample QC stages, from per-sample metrics through the finalized sample metadata table
//!

pub mod ancestry;
pub mod hard_filters;
pub mod interval_qc;
pub mod metadata;
mod metrics;
pub mod outlier_filtering;
pub mod relatedness;
pub mod sex_inference;
pub mod subpop;

pub use self::ancestry::run_assign_ancestry;
pub use self::hard_filters::run_hard_filters;
pub use self::interval_qc::run_interval_qc;
pub use self::metadata::{SampleMetadata, run_finalize_metadata};
pub use self::metrics::SampleQcMetrics;
pub use self::outlier_filtering::run_outlier_filtering;
pub use self::relatedness::run_relatedness;
pub use self::sex_inference::run_sex_inference;
pub use self::subpop::run_subpop_analysis;
