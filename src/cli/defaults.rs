//! Default values for command-line settings
//!

pub const DEFAULT_PIPELINE_VERSION: &str = "v4.0";

// Genotype adj cutoffs
pub const ADJ_MIN_GQ: i32 = 20;
pub const ADJ_MIN_DP: i32 = 10;
pub const ADJ_MIN_HAPLOID_DP: i32 = 5;
pub const ADJ_MIN_HET_AB: f64 = 0.2;

// Hard filter cutoffs
pub const MAX_N_SINGLETON: f64 = 5000.0;
pub const MAX_R_HET_HOM_VAR: f64 = 10.0;
pub const MIN_BASES_DP_OVER_1: f64 = 5e7;
pub const MIN_BASES_DP_OVER_20: f64 = 4e7;
pub const MAX_CONTAMINATION: f64 = 0.05;
pub const MAX_CHIMERA: f64 = 0.05;

// Sex imputation
pub const F_STAT_CUTOFF: f64 = 0.5;
pub const SEX_AAF_THRESHOLD: f64 = 0.001;
pub const NORMAL_PLOIDY_SD: f64 = 5.0;
pub const ANEUPLOIDY_SD: f64 = 6.0;

// Interval QC
pub const MEAN_DP_THRESHOLDS: [u32; 5] = [5, 10, 15, 20, 25];
pub const MEAN_FRACTION_OVER_DP_0: f64 = 0.99;
pub const AUTOSOME_PAR_XX_COV: u32 = 20;
pub const XY_NONPAR_COV: u32 = 10;
pub const PROP_SAMPLES_OVER_COV: f64 = 0.85;

// Relatedness
pub const SECOND_DEGREE_MIN_KIN: f64 = 0.1;
pub const FIRST_DEGREE_KIN_THRESHOLDS: [f64; 2] = [0.19, 0.4];
pub const IBD0_0_MAX: f64 = 0.025;
pub const IBD0_25_THRESHOLDS: [f64; 2] = [0.1, 0.425];
pub const IBD1_0_THRESHOLDS: [f64; 2] = [-0.2, 0.1];
pub const IBD1_50_THRESHOLDS: [f64; 2] = [0.4, 0.6];
pub const IBD1_100_MIN: f64 = 0.75;
pub const IBD2_0_MAX: f64 = 0.125;
pub const IBD2_25_THRESHOLDS: [f64; 2] = [0.1, 0.5];
pub const IBD2_100_THRESHOLDS: [f64; 2] = [0.75, 1.25];

pub const CUKING_SPLIT_FACTOR: usize = 4;

// Ancestry
pub const N_PCS: usize = 30;
pub const POP_N_PCS: usize = 16;
pub const MIN_POP_PROB: f64 = 0.75;
pub const N_TREES: usize = 100;
pub const ANCESTRY_SEED: u64 = 24;
pub const MISSING_POP_LABEL: &str = "unassigned";

// Subpopulation analysis
pub const SUBPOP_N_PCS: usize = 10;
pub const SUBPOP_MIN_AF: f64 = 0.001;
pub const SUBPOP_MIN_CALLRATE: f64 = 0.99;
pub const SUBPOP_MIN_INBREEDING_COEFF: f64 = -0.25;
pub const SUBPOP_MIN_HWE_PVALUE: f64 = 1e-8;
pub const SUBPOP_LD_R2: f64 = 0.1;
pub const LD_WINDOW_BP: i64 = 1_000_000;

// Outlier filtering
pub const REGRESS_N_PCS: usize = 10;
pub const OUTLIER_THRESHOLD: f64 = 4.0;
pub const OUTLIER_QC_METRICS: [&str; 11] = [
    "n_snp",
    "n_singleton",
    "r_ti_tv",
    "r_insertion_deletion",
    "n_insertion",
    "n_deletion",
    "r_het_hom_var",
    "n_het",
    "n_hom_var",
    "n_transition",
    "n_transversion",
];

// Frequency
pub const DOWNSAMPLINGS: [u32; 10] = [10, 100, 500, 1000, 2000, 5000, 10000, 20000, 50000, 100000];
pub const DOWNSAMPLING_SEED: u64 = 42;
pub const POPS_TO_REMOVE_FOR_POPMAX: [&str; 6] = ["asj", "fin", "mid", "oth", "ami", "remaining"];
pub const RELEASE_SUBSETS: [&str; 2] = ["hgdp", "tgp"];
