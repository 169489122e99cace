//! Population-stratified outlier detection on sample QC metrics
//!
//! QC metrics are optionally regressed on the top ancestry PCs first. Each metric is then compared
//! with the distribution of the same metric among samples of the same assigned population.
//!

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use super::SampleQcMetrics;
use super::ancestry::{PopAssignment, PopAssignmentGlobals};
use super::hard_filters::{HardFilterGlobals, SampleHardFilters};
use crate::cli::{OutlierFilteringSettings, SharedSettings};
use crate::log_utils::log_category_counts;
use crate::resources::Resource;
use crate::run_stats::{OutlierStats, write_run_stats};
use crate::stats_utils::{mean_and_stdev, median, median_absolute_deviation, ols_fit};
use crate::table::{KeyedRow, NoGlobals, Table};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, clap::ValueEnum)]
pub enum OutlierMethod {
    /// Median and scaled median absolute deviation
    Mad,

    /// Mean and standard deviation
    ZScore,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OutlierParams {
    pub method: OutlierMethod,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
    pub regress_n_pcs: usize,
    pub qc_metrics: Vec<String>,
}

/// Per-sample input to outlier detection
///
#[derive(Clone, Debug, Default)]
pub struct OutlierInput {
    pub s: String,
    pub pop: String,
    pub pcs: Vec<f64>,
    pub metrics: BTreeMap<String, Option<f64>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MetricBounds {
    pub center: f64,
    pub spread: f64,
    pub lower: f64,
    pub upper: f64,
    pub sample_count: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SampleOutlierFilters {
    pub s: String,
    pub pop: String,

    /// Metric values used for filtering, residuals when PCs were regressed out
    pub metrics: BTreeMap<String, Option<f64>>,

    /// Failed metric filters, named `fail_<metric>`
    pub qc_metrics_filters: BTreeSet<String>,

    pub outlier_filtered: bool,
}

impl KeyedRow for SampleOutlierFilters {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OutlierGlobals {
    pub params: OutlierParams,

    /// Regression coefficients of each metric, intercept first
    pub regression_coefficients: BTreeMap<String, Vec<f64>>,

    /// Bounds of each metric within each population
    pub bounds: BTreeMap<String, BTreeMap<String, MetricBounds>>,
}

/// Replace metric values with residuals of an OLS fit on the top `n_pcs` PCs, with intercept
///
/// Returns the fitted coefficients of each metric. Samples with a missing metric keep a missing
/// value.
///
pub fn regress_out_pcs(
    inputs: &mut [OutlierInput],
    metrics: &[String],
    n_pcs: usize,
) -> SimpleResult<BTreeMap<String, Vec<f64>>> {
    if let Some(x) = inputs.iter().find(|x| x.pcs.len() < n_pcs) {
        bail!(
            "Sample '{}' has {} PCs but {n_pcs} are required for metric regression",
            x.s,
            x.pcs.len()
        );
    }

    let mut coefficients = BTreeMap::new();
    for metric in metrics {
        let rows = inputs
            .iter()
            .enumerate()
            .filter_map(|(i, x)| x.metrics.get(metric).copied().flatten().map(|v| (i, v)))
            .collect::<Vec<_>>();
        if rows.is_empty() {
            continue;
        }

        let mut design = Array2::<f64>::ones((rows.len(), n_pcs + 1));
        for (r, &(i, _)) in rows.iter().enumerate() {
            for pc in 0..n_pcs {
                design[[r, pc + 1]] = inputs[i].pcs[pc];
            }
        }
        let y = Array1::from_iter(rows.iter().map(|x| x.1));
        let beta = ols_fit(&design, &y)?;
        let fitted = design.dot(&beta);
        for (r, &(i, v)) in rows.iter().enumerate() {
            inputs[i].metrics.insert(metric.clone(), Some(v - fitted[r]));
        }
        coefficients.insert(metric.clone(), beta.to_vec());
    }
    Ok(coefficients)
}

/// Compute bounds of every metric within every population
///
pub fn compute_stratified_bounds(
    inputs: &[OutlierInput],
    params: &OutlierParams,
) -> BTreeMap<String, BTreeMap<String, MetricBounds>> {
    let mut values = BTreeMap::<&str, BTreeMap<&str, Vec<f64>>>::new();
    for x in inputs {
        for metric in params.qc_metrics.iter() {
            if let Some(v) = x.metrics.get(metric).copied().flatten() {
                values
                    .entry(x.pop.as_str())
                    .or_default()
                    .entry(metric.as_str())
                    .or_default()
                    .push(v);
            }
        }
    }

    values
        .into_iter()
        .map(|(pop, metrics)| {
            let bounds = metrics
                .into_iter()
                .filter_map(|(metric, v)| {
                    let (center, spread) = match params.method {
                        OutlierMethod::Mad => {
                            let center = median(&v)?;
                            (center, median_absolute_deviation(&v, center)?)
                        }
                        OutlierMethod::ZScore => mean_and_stdev(&v)?,
                    };
                    let bounds = MetricBounds {
                        center,
                        spread,
                        lower: center - params.lower_threshold * spread,
                        upper: center + params.upper_threshold * spread,
                        sample_count: v.len(),
                    };
                    Some((metric.to_string(), bounds))
                })
                .collect();
            (pop.to_string(), bounds)
        })
        .collect()
}

/// Flag every metric outside of the bounds for the sample's population
///
/// A missing metric value never fails.
///
pub fn apply_outlier_filters(
    inputs: Vec<OutlierInput>,
    bounds: &BTreeMap<String, BTreeMap<String, MetricBounds>>,
) -> Vec<SampleOutlierFilters> {
    inputs
        .into_iter()
        .map(|x| {
            let pop_bounds = bounds.get(&x.pop);
            let qc_metrics_filters = x
                .metrics
                .iter()
                .filter(|(metric, v)| {
                    let b = pop_bounds.and_then(|b| b.get(*metric));
                    match (v, b) {
                        (Some(v), Some(b)) => *v < b.lower || *v > b.upper,
                        _ => false,
                    }
                })
                .map(|(metric, _)| format!("fail_{metric}"))
                .collect::<BTreeSet<_>>();
            SampleOutlierFilters {
                outlier_filtered: !qc_metrics_filters.is_empty(),
                s: x.s,
                pop: x.pop,
                metrics: x.metrics,
                qc_metrics_filters,
            }
        })
        .collect()
}

/// Run the outlier filtering stage
///
pub fn run_outlier_filtering(
    shared: &SharedSettings,
    settings: &OutlierFilteringSettings,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let params = settings.params();

    let hard_filters: Table<SampleHardFilters, HardFilterGlobals> =
        layout.read(&Resource::HardFilters)?;
    let sample_qc: Table<SampleQcMetrics, NoGlobals> = layout.read(&Resource::SampleQcMetrics)?;
    let pops: Table<PopAssignment, PopAssignmentGlobals> = layout.read(&Resource::PopAssignment)?;

    let mut inputs = Vec::new();
    let mut missing = Vec::new();
    for x in hard_filters.rows().iter().filter(|x| !x.hard_filtered) {
        let (Some(qc), Some(pop)) = (sample_qc.get(&x.s), pops.get(&x.s)) else {
            missing.push(x.s.as_str());
            continue;
        };
        inputs.push(OutlierInput {
            s: x.s.clone(),
            pop: pop.pop.clone(),
            pcs: pop.pca_scores.clone(),
            metrics: params
                .qc_metrics
                .iter()
                .map(|m| (m.clone(), qc.get_metric(m)))
                .collect(),
        });
    }
    if !missing.is_empty() {
        bail!(
            "{} samples passing hard filters are missing from the sample QC or population tables, including '{}'",
            missing.len(),
            missing[0]
        );
    }
    info!(
        "Running outlier detection for {} samples passing hard filters",
        inputs.len().separate_with_commas()
    );

    let regression_coefficients = if params.regress_n_pcs > 0 {
        info!("Regressing QC metrics on the top {} PCs", params.regress_n_pcs);
        regress_out_pcs(&mut inputs, &params.qc_metrics, params.regress_n_pcs)?
    } else {
        BTreeMap::new()
    };

    let bounds = compute_stratified_bounds(&inputs, &params);
    let results = apply_outlier_filters(inputs, &bounds);

    let mut stats = OutlierStats {
        sample_count: results.len(),
        outlier_filtered_sample_count: results.iter().filter(|x| x.outlier_filtered).count(),
        ..Default::default()
    };
    for x in results.iter() {
        for f in x.qc_metrics_filters.iter() {
            *stats.fail_counts.entry(f.clone()).or_insert(0) += 1;
        }
    }
    info!(
        "{} of {} samples flagged as QC metric outliers",
        stats.outlier_filtered_sample_count.separate_with_commas(),
        stats.sample_count.separate_with_commas()
    );
    log_category_counts("Samples failing", &stats.fail_counts);

    let globals = OutlierGlobals {
        params,
        regression_coefficients,
        bounds,
    };
    let table = Table::new(globals, results)?;
    layout.write(&Resource::OutlierFiltering, &table, shared.overwrite)?;
    write_run_stats(shared, "outlier_filtering", &stats)
}
