use std::iter::Sum;

use ndarray::{Array1, Array2};
use ndarray_linalg::{Cholesky, Diag, SolveTriangular, UPLO};
use num::{Float, NumCast};
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, map_err_with};
use statrs::distribution::{DiscreteCDF, Poisson};

/// Scale factor making the median absolute deviation a consistent estimator of a normal standard deviation
pub const MAD_NORMAL_SCALE: f64 = 1.4826;

pub fn mean<F: Float + Sum<F>>(x: &[F]) -> Option<F> {
    if x.is_empty() {
        return None;
    }
    let n: F = NumCast::from(x.len())?;
    Some(x.iter().copied().sum::<F>() / n)
}

/// Mean and population standard deviation
///
pub fn mean_and_stdev<F: Float + Sum<F>>(x: &[F]) -> Option<(F, F)> {
    let m = mean(x)?;
    let n: F = NumCast::from(x.len())?;
    let var = x.iter().map(|v| (*v - m) * (*v - m)).sum::<F>() / n;
    Some((m, var.sqrt()))
}

pub fn median(x: &[f64]) -> Option<f64> {
    if x.is_empty() {
        return None;
    }
    let mut v = x.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Median absolute deviation around `center`, scaled to be comparable with a normal standard deviation
///
pub fn median_absolute_deviation(x: &[f64], center: f64) -> Option<f64> {
    let deviations = x.iter().map(|v| (v - center).abs()).collect::<Vec<_>>();
    median(&deviations).map(|v| v * MAD_NORMAL_SCALE)
}

/// Solve the symmetric positive definite system `a * x = b` by Cholesky decomposition
///
/// Fails if the dimensions disagree, or if `a` is singular or numerically rank deficient, judged by
/// the ratio of the smallest to the largest diagonal element of its Cholesky factor.
///
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> SimpleResult<Array1<f64>> {
    const MIN_PIVOT_RATIO: f64 = 1e-8;

    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        bail!(
            "Can't solve a {}x{} system with {} right-hand side values",
            n,
            a.ncols(),
            b.len()
        );
    }
    let l = map_err_with!(
        a.cholesky(UPLO::Lower),
        "Matrix is not positive definite, regression design may be singular"
    )?;
    let diag = l.diag();
    let max_pivot = diag.iter().copied().fold(0.0, f64::max);
    let min_pivot = diag.iter().copied().fold(f64::INFINITY, f64::min);
    if !(min_pivot > MIN_PIVOT_RATIO * max_pivot) {
        bail!("Matrix is numerically singular, regression design may contain collinear columns");
    }

    let y = map_err_with!(
        l.solve_triangular(UPLO::Lower, Diag::NonUnit, b),
        "Forward substitution failed"
    )?;
    let x = map_err_with!(
        l.t().solve_triangular(UPLO::Upper, Diag::NonUnit, &y),
        "Back substitution failed"
    )?;
    Ok(x)
}

/// Ordinary least squares fit of `y` on the columns of `x`
///
/// Returns the coefficient vector. `x` should already include an intercept column if one is wanted.
///
pub fn ols_fit(x: &Array2<f64>, y: &Array1<f64>) -> SimpleResult<Array1<f64>> {
    if x.nrows() != y.len() {
        bail!("Regression design has {} rows but {} responses", x.nrows(), y.len());
    }
    if x.nrows() < x.ncols() {
        bail!(
            "Too few observations ({}) to fit {} regression coefficients",
            x.nrows(),
            x.ncols()
        );
    }
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    cholesky_solve(&xtx, &xty)
}

/// Filtering allele frequency
///
/// The highest true allele frequency for which the observed allele count would have no more than a
/// `1 - confidence` chance of being at least `ac`, under a Poisson model of allele counts. Returns 0
/// for singletons and when no alleles were called.
///
pub fn filtering_allele_frequency(ac: u32, an: u32, confidence: f64) -> f64 {
    if ac <= 1 || an == 0 {
        return 0.0;
    }

    let tail_prob = |lambda: f64| -> f64 {
        match Poisson::new(lambda) {
            Ok(p) => 1.0 - p.cdf((ac - 1) as u64),
            Err(_) => 0.0,
        }
    };

    let target = 1.0 - confidence;
    let mut lo = 1e-12;
    let mut hi = ac as f64;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if tail_prob(mid) > target {
            hi = mid;
        } else {
            lo = mid;
        }
        if (hi - lo) <= 1e-12 * hi {
            break;
        }
    }
    lo / an as f64
}

/// Exact test of Hardy-Weinberg equilibrium for biallelic diploid genotype counts
///
/// Returns the two-sided p-value, the summed probability of all heterozygote counts no more likely
/// than the observed one given the allele counts. Sites without called genotypes return 1.
///
pub fn hardy_weinberg_pvalue(n_hom_ref: u64, n_het: u64, n_hom_var: u64) -> f64 {
    let n = n_hom_ref + n_het + n_hom_var;
    if n == 0 {
        return 1.0;
    }
    let n_rare_hom = n_hom_ref.min(n_hom_var);
    let rare = (2 * n_rare_hom + n_het) as usize;
    let n = n as usize;

    // Heterozygote count parity always matches the rare allele count
    let mut mid = (rare as f64 * (2 * n - rare) as f64 / (2 * n) as f64) as usize;
    if mid % 2 != rare % 2 {
        mid += 1;
    }

    let mut probs = vec![0.0; rare + 1];
    probs[mid] = 1.0;
    let mut sum = 1.0;

    let (mut het, mut hom_rare) = (mid, (rare - mid) / 2);
    let mut hom_common = n - mid - hom_rare;
    while het >= 2 {
        probs[het - 2] = probs[het] * (het * (het - 1)) as f64
            / (4.0 * (hom_rare + 1) as f64 * (hom_common + 1) as f64);
        sum += probs[het - 2];
        het -= 2;
        hom_rare += 1;
        hom_common += 1;
    }

    let (mut het, mut hom_rare) = (mid, (rare - mid) / 2);
    let mut hom_common = n - mid - hom_rare;
    while het + 2 <= rare {
        probs[het + 2] =
            probs[het] * 4.0 * hom_rare as f64 * hom_common as f64 / ((het + 2) * (het + 1)) as f64;
        sum += probs[het + 2];
        het += 2;
        hom_rare -= 1;
        hom_common -= 1;
    }

    let observed = probs[n_het as usize];
    let p: f64 = probs.iter().filter(|&&x| x <= observed * (1.0 + 1e-8)).sum();
    (p / sum).min(1.0)
}

/// Fixed-width histogram over `[start, end]`
///
/// Values equal to `end` fall in the last bin. Values outside of the range are counted separately.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Histogram {
    pub bin_edges: Vec<f64>,
    pub bin_freq: Vec<u64>,
    pub n_smaller: u64,
    pub n_larger: u64,
}

impl Histogram {
    pub fn new(start: f64, end: f64, bins: usize) -> Self {
        assert!(bins > 0 && end > start);
        let width = (end - start) / bins as f64;
        Self {
            bin_edges: (0..=bins).map(|i| start + width * i as f64).collect(),
            bin_freq: vec![0; bins],
            n_smaller: 0,
            n_larger: 0,
        }
    }

    pub fn add(&mut self, value: f64) {
        let bins = self.bin_freq.len();
        let start = self.bin_edges[0];
        let end = self.bin_edges[bins];
        if value < start {
            self.n_smaller += 1;
        } else if value > end {
            self.n_larger += 1;
        } else {
            let bin = (((value - start) / (end - start)) * bins as f64) as usize;
            self.bin_freq[bin.min(bins - 1)] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.bin_freq.iter().sum::<u64>() + self.n_smaller + self.n_larger
    }
}
