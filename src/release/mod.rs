//! Release assembly: variant annotations, subset sample annotations and the dense subset
//!

mod annotations;
mod dense_subset;
mod sample_annotations;

use std::collections::BTreeSet;

use camino::Utf8Path;
use log::info;
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use self::annotations::{
    AnnotationSources, VariantAnnotation, VariantAnnotationGlobals, build_variant_annotations,
    read_as_lowqual, read_dbsnp, read_filtering_model, read_in_silico, read_vep,
};
use self::dense_subset::{DenseSubsetGlobals, build_dense_subset};
use self::sample_annotations::{
    SubsetSampleAnnotation, SubsetSampleGlobals, build_subset_sample_annotations,
};
use crate::cli::{CreateReleaseSettings, SharedSettings};
use crate::freq::{FreqTable, freq_resource};
use crate::genome_regions::GenomeRegions;
use crate::genotype_matrix::read_genotype_matrix;
use crate::resources::{Resource, ResourceLayout};
use crate::run_stats::{ReleaseStats, write_run_stats};
use crate::sample_qc::SampleMetadata;
use crate::sample_qc::metadata::MetadataGlobals;
use crate::table::Table;
use crate::tsv_utils::read_id_list;

type VariantAnnotationTable = Table<VariantAnnotation, VariantAnnotationGlobals>;
type SubsetSampleTable = Table<SubsetSampleAnnotation, SubsetSampleGlobals>;

fn read_optional_source<T: Default>(
    filename: &Option<String>,
    reader: impl Fn(&Utf8Path) -> SimpleResult<T>,
) -> SimpleResult<T> {
    match filename {
        Some(x) => reader(Utf8Path::new(x)),
        None => Ok(T::default()),
    }
}

fn read_regions(filename: &Option<String>, label: &str) -> SimpleResult<GenomeRegions> {
    read_optional_source(filename, |x| GenomeRegions::from_bed(x, label))
}

fn read_annotation_sources(settings: &CreateReleaseSettings) -> SimpleResult<AnnotationSources> {
    Ok(AnnotationSources {
        filtering: read_optional_source(&settings.filtering_model_filename, read_filtering_model)?,
        as_lowqual: read_optional_source(&settings.as_lowqual_filename, read_as_lowqual)?,
        vep: read_optional_source(&settings.vep_filename, read_vep)?,
        dbsnp: read_optional_source(&settings.dbsnp_filename, read_dbsnp)?,
        in_silico: read_optional_source(&settings.in_silico_filename, read_in_silico)?,
        lcr: read_regions(&settings.lcr_filename, "low complexity")?,
        segdup: read_regions(&settings.segdup_filename, "segmental duplication")?,
        telomere_centromere: read_regions(
            &settings.telomere_centromere_filename,
            "telomere and centromere",
        )?,
    })
}

fn prepare_variant_annotations(
    shared: &SharedSettings,
    settings: &CreateReleaseSettings,
    layout: &ResourceLayout,
    stats: &mut ReleaseStats,
) -> SimpleResult<()> {
    let freq: FreqTable = layout.read(&freq_resource(&[]))?;
    let subset_freq: FreqTable = layout.read(&freq_resource(&settings.subsets))?;
    let sources = read_annotation_sources(settings)?;

    let (rows, globals) = build_variant_annotations(&freq, &subset_freq, &sources)?;
    stats.variant_annotation_count = rows.len();
    info!(
        "Assembled annotations for {} variants",
        rows.len().separate_with_commas()
    );

    let table = Table::new(globals, rows)?;
    layout.write(&Resource::VariantAnnotations, &table, shared.overwrite)
}

fn prepare_sample_annotations(
    shared: &SharedSettings,
    settings: &CreateReleaseSettings,
    layout: &ResourceLayout,
    stats: &mut ReleaseStats,
) -> SimpleResult<()> {
    let metadata: Table<SampleMetadata, MetadataGlobals> =
        layout.read(&Resource::FinalizedMetadata)?;
    let pop_outliers = match &settings.pop_outliers_filename {
        Some(x) => read_id_list(Utf8Path::new(x), "population outlier")?,
        None => Vec::new(),
    }
    .into_iter()
    .collect::<BTreeSet<_>>();

    let rows = build_subset_sample_annotations(metadata.rows(), &settings.subsets, &pop_outliers)?;
    stats.subset_sample_count = rows.len();

    let globals = SubsetSampleGlobals {
        subsets: settings.subsets.clone(),
        pop_outliers,
        metadata: metadata.globals.clone(),
    };
    let table = Table::new(globals, rows)?;
    layout.write(&Resource::SubsetSampleAnnotations, &table, shared.overwrite)
}

fn create_dense_subset(
    shared: &SharedSettings,
    settings: &CreateReleaseSettings,
    layout: &ResourceLayout,
    stats: &mut ReleaseStats,
) -> SimpleResult<()> {
    let sample_annotations: SubsetSampleTable =
        layout.read(&Resource::SubsetSampleAnnotations)?;
    let variant_annotations: VariantAnnotationTable =
        layout.read(&Resource::VariantAnnotations)?;
    let Some(vcf_filename) = &settings.vcf_filename else {
        bail!("--vcf is required with --create-dense-subset");
    };
    let matrix = read_genotype_matrix(Utf8Path::new(vcf_filename), layout.record_limit())?;

    let adj_cutoffs = settings.adj.cutoffs();
    let (rows, samples, counts) = build_dense_subset(
        &matrix,
        &sample_annotations,
        &variant_annotations,
        &adj_cutoffs,
    );
    stats.dense_subset_variant_count = rows.len();
    stats.dropped_subset_allele_count = counts.alleles.dropped_allele_count;
    stats.unsplit_subset_record_count = counts.alleles.unsplit_record_count;
    stats.excluded_no_annotation_count = counts.excluded_no_annotation_count;
    stats.excluded_as_lowqual_count = counts.excluded_as_lowqual_count;
    stats.excluded_telomere_or_centromere_count = counts.excluded_telomere_or_centromere_count;
    stats.excluded_no_alt_count = counts.excluded_no_alt_count;

    let globals = DenseSubsetGlobals {
        samples,
        variant_annotations: variant_annotations.globals.clone(),
        adj_cutoffs,
    };
    let table = Table::new(globals, rows)?;
    layout.write(&Resource::DenseSubset, &table, shared.overwrite)
}

/// Run each requested release assembly step
///
/// Steps run in the order variant annotations, sample annotations, dense subset, so that a single
/// invocation can produce the dense subset from fresh annotation tables.
///
pub fn run_create_release(
    shared: &SharedSettings,
    settings: &CreateReleaseSettings,
) -> SimpleResult<()> {
    let layout = shared.resource_layout();
    let mut stats = ReleaseStats::default();

    if settings.prepare_variant_annotations {
        prepare_variant_annotations(shared, settings, &layout, &mut stats)?;
    }
    if settings.prepare_sample_annotations {
        prepare_sample_annotations(shared, settings, &layout, &mut stats)?;
    }
    if settings.create_dense_subset {
        create_dense_subset(shared, settings, &layout, &mut stats)?;
    }

    write_run_stats(shared, "create_release", &stats)
}
