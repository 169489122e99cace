//! HWE-normalized PCA of the dense QC genotype matrix and projection of all samples onto the PCs
//!

use std::collections::HashSet;

use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, QR, UPLO};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, map_err_with};
use thousands::Separable;

use crate::genotype_matrix::{GenotypeMatrix, VariantRow};
use crate::locus::VariantKey;
use crate::table::KeyedRow;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PcaEigenvalue {
    /// 1-based PC index
    pub pc: usize,
    pub eigenvalue: f64,
}

impl KeyedRow for PcaEigenvalue {
    type Key = usize;
    fn key(&self) -> usize {
        self.pc
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PcaScore {
    pub s: String,
    pub scores: Vec<f64>,

    /// Sample was used to compute the PCs, all other samples are projected
    pub training: bool,
}

impl KeyedRow for PcaScore {
    type Key = String;
    fn key(&self) -> String {
        self.s.clone()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PcaLoading {
    pub key: VariantKey,
    pub loadings: Vec<f64>,

    /// Alt allele frequency among training samples, used to normalize projected genotypes
    pub pca_af: f64,
}

impl KeyedRow for PcaLoading {
    type Key = VariantKey;
    fn key(&self) -> VariantKey {
        self.key.clone()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PcaGlobals {
    pub n_pcs: usize,
    pub method: PcaMethod,
    pub include_unreleasable: bool,
    pub training_sample_count: usize,
    pub variant_count: usize,
}

pub struct PcaResult {
    pub method: PcaMethod,
    pub eigenvalues: Vec<f64>,
    pub scores: Vec<PcaScore>,
    pub loadings: Vec<PcaLoading>,
}

/// Diploid alt dosage, haploid and missing calls are treated as missing
fn dosage(row: &VariantRow, sample_index: usize) -> Option<f64> {
    row.entries[sample_index]
        .gt
        .filter(|x| x.ploidy() == 2)
        .map(|x| x.n_alt_alleles() as f64)
}

fn is_pca_site(row: &VariantRow) -> bool {
    row.key.is_biallelic() && row.key.locus.in_autosome()
}

/// Normalized genotype for one sample at one variant
///
/// # Arguments
/// * `scale` - `sqrt(2p(1-p)m)` for training allele frequency p over m variants
///
fn normalized_dosage(g: Option<f64>, p: f64, scale: f64) -> f64 {
    match g {
        Some(g) => (g - 2.0 * p) / scale,
        None => 0.0,
    }
}

/// Training sample count above which the top PCs come from a randomized range finder instead of a
/// full eigendecomposition of the training sample Gram matrix
pub const MAX_EXACT_PCA_SAMPLES: usize = 5000;

const RANDOMIZED_OVERSAMPLING: usize = 10;
const RANDOMIZED_POWER_ITERATIONS: usize = 4;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PcaMethod {
    #[default]
    Exact,
    Randomized,
}

impl PcaMethod {
    pub fn for_training_sample_count(n_train: usize) -> Self {
        if n_train > MAX_EXACT_PCA_SAMPLES {
            PcaMethod::Randomized
        } else {
            PcaMethod::Exact
        }
    }
}

/// Largest `k` eigenpairs of a symmetric matrix, in descending eigenvalue order
///
fn top_symmetric_eigen(a: &Array2<f64>, k: usize) -> SimpleResult<(Vec<f64>, Array2<f64>)> {
    let (values, vectors) = map_err_with!(a.eigh(UPLO::Lower), "Eigendecomposition failed")?;
    // eigh returns ascending eigenvalues
    let order = (0..k.min(values.len()))
        .map(|i| values.len() - 1 - i)
        .collect::<Vec<_>>();
    let top_values = order.iter().map(|&i| values[i]).collect();
    Ok((top_values, vectors.select(Axis(1), &order)))
}

fn orthonormal_basis(a: &Array2<f64>) -> SimpleResult<Array2<f64>> {
    let (q, _) = map_err_with!(a.qr(), "QR decomposition failed")?;
    Ok(q)
}

/// Top eigenpairs of `X^T X` by randomized range finding with power iterations
///
/// With `Q` an orthonormal basis for the dominant column space of `X`, and `B = Q^T X`, the top
/// eigenvectors of `X^T X` are approximated from the small matrix `B B^T`.
///
fn randomized_top_eigen(
    x: &Array2<f64>,
    k: usize,
    seed: u64,
) -> SimpleResult<(Vec<f64>, Array2<f64>)> {
    let (m, n) = x.dim();
    let l = (k + RANDOMIZED_OVERSAMPLING).min(m).min(n);
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let omega = Array2::<f64>::from_shape_fn((n, l), |_| rng.gen_range(-1.0..1.0));

    let mut q = orthonormal_basis(&x.dot(&omega))?;
    for _ in 0..RANDOMIZED_POWER_ITERATIONS {
        let z = orthonormal_basis(&x.t().dot(&q))?;
        q = orthonormal_basis(&x.dot(&z))?;
    }

    let b = q.t().dot(x);
    let (eigenvalues, w) = top_symmetric_eigen(&b.dot(&b.t()), k)?;
    let mut vectors = Array2::<f64>::zeros((n, eigenvalues.len()));
    for (pc, &eigenvalue) in eigenvalues.iter().enumerate() {
        if eigenvalue > 0.0 {
            let v = b.t().dot(&w.column(pc)) / eigenvalue.sqrt();
            vectors.column_mut(pc).assign(&v);
        }
    }
    Ok((eigenvalues, vectors))
}

/// Top `k` eigenpairs of the sample Gram matrix `X^T X`, for variants in rows of `X`
///
/// Each eigenvector's sign is fixed so that its largest-magnitude element is positive.
///
pub fn gram_top_eigen(
    x: &Array2<f64>,
    k: usize,
    method: PcaMethod,
    seed: u64,
) -> SimpleResult<(Vec<f64>, Array2<f64>)> {
    let (eigenvalues, mut vectors) = match method {
        PcaMethod::Exact => top_symmetric_eigen(&x.t().dot(x), k)?,
        PcaMethod::Randomized => randomized_top_eigen(x, k, seed)?,
    };
    for mut u in vectors.columns_mut() {
        let max_index = (0..u.len())
            .max_by(|&a, &b| u[a].abs().total_cmp(&u[b].abs()).then(b.cmp(&a)))
            .unwrap_or(0);
        if u.get(max_index).is_some_and(|x| *x < 0.0) {
            u.mapv_inplace(|x| -x);
        }
    }
    Ok((eigenvalues, vectors))
}

/// Run HWE-normalized PCA over the training samples and project every matrix sample
///
/// Only biallelic autosomal variants which are polymorphic among the training samples are used.
/// Training sample scores computed by projection are identical to `sqrt(eigenvalue) * u`.
///
pub fn run_hwe_normalized_pca(
    matrix: &GenotypeMatrix,
    training_samples: &HashSet<&str>,
    n_pcs: usize,
    seed: u64,
) -> SimpleResult<PcaResult> {
    let training_indexes = matrix
        .samples
        .iter()
        .enumerate()
        .filter(|(_, s)| training_samples.contains(s.as_str()))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    let n_train = training_indexes.len();
    if n_train < 2 {
        bail!("PCA requires at least 2 training samples, found {n_train}");
    }

    // Training allele frequency of each usable variant
    let sites = matrix
        .rows
        .par_iter()
        .enumerate()
        .filter(|(_, row)| is_pca_site(row))
        .filter_map(|(row_index, row)| {
            let (sum, count) = training_indexes
                .iter()
                .filter_map(|&i| dosage(row, i))
                .fold((0.0, 0usize), |(s, c), g| (s + g, c + 1));
            if count == 0 {
                return None;
            }
            let p = sum / (2.0 * count as f64);
            if p <= 0.0 || p >= 1.0 {
                None
            } else {
                Some((row_index, p))
            }
        })
        .collect::<Vec<_>>();
    let m = sites.len();
    if m == 0 {
        bail!("No polymorphic biallelic autosomal variants available for PCA");
    }
    let method = PcaMethod::for_training_sample_count(n_train);
    info!(
        "Running {method} PCA on {} training samples over {} variants",
        n_train.separate_with_commas(),
        m.separate_with_commas()
    );

    let scale = |p: f64| (2.0 * p * (1.0 - p) * m as f64).sqrt();

    let mut x = Array2::<f64>::zeros((m, n_train));
    x.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(sites.par_iter())
        .for_each(|(mut out_row, &(row_index, p))| {
            let row = &matrix.rows[row_index];
            let sd = scale(p);
            for (out, &i) in out_row.iter_mut().zip(training_indexes.iter()) {
                *out = normalized_dosage(dosage(row, i), p, sd);
            }
        });

    let (eigenvalues, vectors) = gram_top_eigen(&x, n_pcs.min(n_train), method, seed)?;

    let mut k = eigenvalues.len();
    if let Some(first_nonpositive) = eigenvalues.iter().take(k).position(|&x| x <= 1e-12) {
        warn!(
            "Only {first_nonpositive} of {k} requested PCs have a positive eigenvalue, reducing the PC count"
        );
        k = first_nonpositive;
    }
    if k == 0 {
        bail!("PCA produced no PCs with a positive eigenvalue");
    }
    let eigenvalues = eigenvalues[..k].to_vec();

    // loadings = X u / sqrt(lambda)
    let mut loading_matrix = Array2::<f64>::zeros((m, k));
    for pc in 0..k {
        let u = vectors.column(pc);
        let loading: Array1<f64> = x.dot(&u) / eigenvalues[pc].sqrt();
        loading_matrix.column_mut(pc).assign(&loading);
    }

    let loadings = sites
        .iter()
        .enumerate()
        .map(|(site_index, &(row_index, p))| PcaLoading {
            key: matrix.rows[row_index].key.clone(),
            loadings: loading_matrix.row(site_index).to_vec(),
            pca_af: p,
        })
        .collect::<Vec<_>>();

    let scores = (0..matrix.sample_count())
        .into_par_iter()
        .map(|sample_index| {
            let mut scores = vec![0.0; k];
            for (site_index, &(row_index, p)) in sites.iter().enumerate() {
                let g = normalized_dosage(dosage(&matrix.rows[row_index], sample_index), p, scale(p));
                if g == 0.0 {
                    continue;
                }
                for (pc, score) in scores.iter_mut().enumerate() {
                    *score += g * loading_matrix[[site_index, pc]];
                }
            }
            let s = &matrix.samples[sample_index];
            PcaScore {
                s: s.clone(),
                scores,
                training: training_samples.contains(s.as_str()),
            }
        })
        .collect::<Vec<_>>();

    Ok(PcaResult {
        method,
        eigenvalues,
        scores,
        loadings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype_matrix::Call;
    use crate::genotype_matrix::tests::entry;
    use crate::locus::Locus;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gram_top_eigen() {
        // X^T X = [[4, 0], [0, 1]]
        let x = array![[2.0, 0.0], [0.0, -1.0], [0.0, 0.0]];
        let (values, vectors) = gram_top_eigen(&x, 2, PcaMethod::Exact, 0).unwrap();
        assert_abs_diff_eq!(values[0], 4.0, epsilon = 1e-10);
        assert_abs_diff_eq!(values[1], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(vectors[[0, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(vectors[[1, 1]], 1.0, epsilon = 1e-10);

        let (values, _) = gram_top_eigen(&x, 1, PcaMethod::Exact, 0).unwrap();
        assert_eq!(values.len(), 1);
    }

    fn test_matrix() -> GenotypeMatrix {
        // Two groups of samples with opposite genotypes at most sites
        let dosages = [
            [0u8, 0, 1, 2, 2, 2],
            [0, 1, 0, 2, 2, 1],
            [2, 2, 2, 0, 0, 1],
            [1, 2, 2, 0, 1, 0],
            [0, 0, 0, 1, 0, 0],
        ];
        let call = |d: u8| match d {
            0 => Call::Diploid(0, 0),
            1 => Call::Diploid(0, 1),
            _ => Call::Diploid(1, 1),
        };
        let rows = dosages
            .iter()
            .enumerate()
            .map(|(i, row)| VariantRow {
                key: VariantKey::new(
                    Locus::new("chr1", 1000 + i as i64),
                    vec!["A".to_string(), "T".to_string()],
                ),
                a_index: 1,
                was_split: false,
                entries: row
                    .iter()
                    .map(|&d| entry(Some(call(d)), 30, 20, [10, 10]))
                    .collect(),
            })
            .collect();
        GenotypeMatrix {
            samples: (1..=6).map(|i| format!("S{i}")).collect(),
            rows,
        }
    }

    /// Normalized training genotypes in loading order
    fn training_matrix(
        matrix: &GenotypeMatrix,
        result: &PcaResult,
        training: &[usize],
    ) -> Array2<f64> {
        let m = result.loadings.len();
        let mut x = Array2::<f64>::zeros((m, training.len()));
        for (site_index, loading) in result.loadings.iter().enumerate() {
            let row = matrix.rows.iter().find(|r| r.key == loading.key).unwrap();
            let p = loading.pca_af;
            let sd = (2.0 * p * (1.0 - p) * m as f64).sqrt();
            for (j, &i) in training.iter().enumerate() {
                x[[site_index, j]] = normalized_dosage(dosage(row, i), p, sd);
            }
        }
        x
    }

    #[test]
    fn test_projection_matches_training_scores() {
        let matrix = test_matrix();
        let training = ["S1", "S2", "S4", "S5", "S6"]
            .into_iter()
            .collect::<HashSet<_>>();
        let result = run_hwe_normalized_pca(&matrix, &training, 3, 24).unwrap();
        assert_eq!(result.method, PcaMethod::Exact);
        assert_eq!(result.scores.len(), 6);
        assert!(!result.scores[2].training);

        // Recompute the training scores directly from the decomposition
        let training_indexes = [0usize, 1, 3, 4, 5];
        let x = training_matrix(&matrix, &result, &training_indexes);
        let gram = x.t().dot(&x);
        for (pc, eigenvalue) in result.eigenvalues.iter().enumerate() {
            let u = training_indexes
                .iter()
                .map(|&i| result.scores[i].scores[pc] / eigenvalue.sqrt())
                .collect::<Array1<f64>>();
            let gu = gram.dot(&u);
            for j in 0..u.len() {
                assert_abs_diff_eq!(gu[j], eigenvalue * u[j], epsilon = 1e-9);
            }
            assert_abs_diff_eq!(u.dot(&u), 1.0, epsilon = 1e-9);
        }
        assert!(result.eigenvalues.windows(2).all(|x| x[0] >= x[1]));

        // First PC separates the two genotype groups
        let pc1 = result.scores.iter().map(|x| x.scores[0]).collect::<Vec<_>>();
        assert!(pc1[0].signum() == pc1[1].signum());
        assert!(pc1[3].signum() == pc1[4].signum());
        assert!(pc1[0].signum() != pc1[3].signum());
    }

    #[test]
    fn test_randomized_matches_exact() {
        let matrix = test_matrix();
        let training = ["S1", "S2", "S3", "S4", "S5", "S6"]
            .into_iter()
            .collect::<HashSet<_>>();
        let result = run_hwe_normalized_pca(&matrix, &training, 2, 24).unwrap();
        let x = training_matrix(&matrix, &result, &[0, 1, 2, 3, 4, 5]);

        let (exact_values, exact_vectors) = gram_top_eigen(&x, 2, PcaMethod::Exact, 24).unwrap();
        let (values, vectors) = gram_top_eigen(&x, 2, PcaMethod::Randomized, 24).unwrap();
        for pc in 0..2 {
            assert_abs_diff_eq!(values[pc], exact_values[pc], epsilon = 1e-8);
            let agreement = vectors.column(pc).dot(&exact_vectors.column(pc)).abs();
            assert_abs_diff_eq!(agreement, 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_method_selection() {
        assert_eq!(PcaMethod::for_training_sample_count(100), PcaMethod::Exact);
        assert_eq!(
            PcaMethod::for_training_sample_count(MAX_EXACT_PCA_SAMPLES + 1),
            PcaMethod::Randomized
        );
    }

    #[test]
    fn test_too_few_training_samples() {
        let matrix = test_matrix();
        let training = HashSet::from(["S1"]);
        assert!(run_hwe_normalized_pca(&matrix, &training, 2, 24).is_err());
    }
}
