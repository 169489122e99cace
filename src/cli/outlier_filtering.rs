use clap::Args;
use simple_error::{SimpleResult, bail};

use super::defaults::{OUTLIER_QC_METRICS, OUTLIER_THRESHOLD, REGRESS_N_PCS};
use crate::sample_qc::SampleQcMetrics;
use crate::sample_qc::outlier_filtering::{OutlierMethod, OutlierParams};

#[derive(Args)]
pub struct OutlierFilteringSettings {
    /// Regress QC metrics on this many top PCs and filter on the residuals. Use 0 to filter on the
    /// raw metrics
    #[arg(long, default_value_t = REGRESS_N_PCS)]
    pub regress_n_pcs: usize,

    /// Flag samples more than this many MADs (or standard deviations) below the population center
    #[arg(long, default_value_t = OUTLIER_THRESHOLD)]
    pub lower_threshold: f64,

    /// Flag samples more than this many MADs (or standard deviations) above the population center
    #[arg(long, default_value_t = OUTLIER_THRESHOLD)]
    pub upper_threshold: f64,

    /// Method used to define the spread of each metric within a population
    #[arg(long, value_enum, default_value_t = OutlierMethod::Mad)]
    pub method: OutlierMethod,

    /// Comma-separated list of QC metrics to filter on
    #[arg(long, value_delimiter = ',', default_values_t = OUTLIER_QC_METRICS.map(String::from))]
    pub qc_metrics: Vec<String>,
}

impl OutlierFilteringSettings {
    pub fn params(&self) -> OutlierParams {
        OutlierParams {
            method: self.method,
            lower_threshold: self.lower_threshold,
            upper_threshold: self.upper_threshold,
            regress_n_pcs: self.regress_n_pcs,
            qc_metrics: self.qc_metrics.clone(),
        }
    }
}

pub fn validate_and_fix_outlier_filtering_settings(
    mut settings: OutlierFilteringSettings,
) -> SimpleResult<OutlierFilteringSettings> {
    if settings.lower_threshold <= 0.0 || settings.upper_threshold <= 0.0 {
        bail!("Outlier thresholds must be positive");
    }
    if settings.qc_metrics.is_empty() {
        bail!("--qc-metrics must name at least one metric");
    }
    for metric in settings.qc_metrics.iter() {
        if !SampleQcMetrics::is_metric_name(metric) {
            bail!("Unknown QC metric in --qc-metrics: '{metric}'");
        }
    }
    settings.qc_metrics.sort();
    settings.qc_metrics.dedup();
    Ok(settings)
}
