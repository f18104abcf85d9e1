use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pcorr::genomics::{
    read_fasta_path, read_gff_cds_path, write_pooled, write_rate_report, write_report,
    BamSiteReader, ClassFilter, CodonTable, Delimiter, DiversityWriter, GenomeProfile, InputError,
    PileupReader, ReadFilter, Region, Site, SiteDiversity, DEFAULT_MIN_BASE_QUALITY,
};
use pcorr::{CorrelationConfig, LagCorrelator, RateCorrelator, DEFAULT_CHUNK_SIZE};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pcorr",
    about = "Position-lag correlation of read diversity from pileups or alignments"
)]
struct Cli {
    /// Verbose logging and full error chains.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute Cs/Cr/Ct per lag over the whole input.
    Ct(CtArgs),
    /// Report per-site nucleotide diversity.
    Pi(PiArgs),
    /// Covariance of per-site diversity between sites a lag apart.
    Cr(CrArgs),
}

#[derive(Args, Debug)]
struct CtArgs {
    /// Input: `.pileup`/`.mpileup` text, `.bam`/`.sam` alignments, or `-` for
    /// pileup on stdin.
    input: PathBuf,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Minimum read pairs for a lag to be compared.
    #[arg(long, default_value_t = pcorr::DEFAULT_MIN_COVERAGE)]
    min_coverage: usize,
    #[command(flatten)]
    chunking: ChunkArgs,
    #[command(flatten)]
    region: RegionArgs,
    #[command(flatten)]
    quality: QualityArgs,
    /// Also write the genome-pooled table to this path.
    #[arg(long)]
    pooled: Option<PathBuf>,
    /// Output path (default: stdout); `.csv` switches to commas.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CrArgs {
    /// Input: `.pileup`/`.mpileup` text, `.bam`/`.sam` alignments, or `-` for
    /// pileup on stdin.
    input: PathBuf,
    #[command(flatten)]
    profile: ProfileArgs,
    #[command(flatten)]
    chunking: ChunkArgs,
    #[command(flatten)]
    region: RegionArgs,
    #[command(flatten)]
    quality: QualityArgs,
    /// Output path (default: stdout); `.csv` switches to commas.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Reference genome (FASTA, first record).
    #[arg(long)]
    fasta: Option<PathBuf>,
    /// CDS annotations (GFF3); enables the position-class filter.
    #[arg(long, requires = "fasta")]
    gff: Option<PathBuf>,
    /// NCBI genetic code (1, 4 or 11).
    #[arg(long, default_value_t = 11)]
    codon_table: u8,
    /// Position class: 0 non-coding, 1 first, 2 second, 3 third, 4 four-fold,
    /// anything else every coding position.
    #[arg(long, default_value_t = 4)]
    position: i64,
}

#[derive(Args, Debug)]
struct ChunkArgs {
    /// Largest lag (exclusive).
    #[arg(long, default_value_t = 300)]
    max_lag: usize,
    /// Chunks with at most this many samples at a lag are excluded there.
    #[arg(long, default_value_t = pcorr::DEFAULT_MIN_CHUNK_SAMPLES)]
    min_chunk_samples: u64,
    /// Chunk width in bases.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,
    /// Worker threads (default: logical CPUs).
    #[arg(long)]
    workers: Option<usize>,
    /// Job queue depth (default: twice the worker count).
    #[arg(long)]
    queue_capacity: Option<usize>,
}

#[derive(Args, Debug)]
struct PiArgs {
    /// Input: `.pileup`/`.mpileup` text, `.bam`/`.sam` alignments, or `-`.
    input: PathBuf,
    #[command(flatten)]
    region: RegionArgs,
    #[command(flatten)]
    quality: QualityArgs,
    /// Output path (default: stdout); `.csv` switches to commas.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RegionArgs {
    /// First position analysed (0-based).
    #[arg(long, default_value_t = 0)]
    region_start: u64,
    /// First position no longer analysed (0-based, default: end of input).
    #[arg(long)]
    region_end: Option<u64>,
}

#[derive(Args, Debug)]
struct QualityArgs {
    /// Minimum base quality.
    #[arg(long, default_value_t = DEFAULT_MIN_BASE_QUALITY)]
    min_base_quality: u8,
    /// Alignments with MAPQ at or below this value are skipped.
    #[arg(long, default_value_t = 0)]
    min_mapping_quality: u8,
}

fn main() {
    let cli = Cli::parse();
    let debug = cli.debug;
    init_tracing(debug);

    if let Err(err) = run(cli) {
        if debug {
            eprintln!("Error: {err:?}");
        } else {
            eprintln!("Error: {err:#}");
        }
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ct(args) => run_ct(args, cli.debug),
        Commands::Pi(args) => run_pi(args),
        Commands::Cr(args) => run_cr(args, cli.debug),
    }
}

struct Reference {
    genome: Option<Arc<[u8]>>,
    profile: Option<Arc<GenomeProfile>>,
}

impl Reference {
    fn load(args: &ProfileArgs) -> Result<Self> {
        let genome = match &args.fasta {
            Some(path) => {
                let record = read_fasta_path(path)
                    .with_context(|| format!("failed to read reference from {}", path.display()))?;
                info!(name = %record.name, length = record.sequence.len(), "loaded reference");
                Some(Arc::<[u8]>::from(record.sequence))
            }
            None => None,
        };

        let profile = match (&args.gff, &genome) {
            (Some(gff), Some(genome)) => {
                let cds = read_gff_cds_path(gff)
                    .with_context(|| format!("failed to read annotations from {}", gff.display()))?;
                let Some(table) = CodonTable::from_id(args.codon_table) else {
                    bail!("unsupported codon table {}", args.codon_table);
                };
                Some(Arc::new(GenomeProfile::build(genome, &cds, &table)))
            }
            _ => None,
        };

        Ok(Self { genome, profile })
    }

    fn class_filter(&self, args: &ProfileArgs) -> Option<(Arc<GenomeProfile>, ClassFilter)> {
        match &self.profile {
            Some(profile) => {
                let filter = ClassFilter::from_selector(args.position);
                info!(?filter, "filtering positions by class");
                Some((Arc::clone(profile), filter))
            }
            None => {
                if self.genome.is_some() {
                    warn!("no annotations given; every position is used");
                }
                None
            }
        }
    }
}

fn correlation_config(
    chunking: &ChunkArgs,
    region: &RegionArgs,
    reference: &Reference,
    debug: bool,
) -> CorrelationConfig {
    let region_end = region
        .region_end
        .or_else(|| reference.profile.as_ref().map(|p| p.len() as u64));

    let mut config = CorrelationConfig::new(chunking.max_lag)
        .with_min_chunk_samples(chunking.min_chunk_samples)
        .with_chunk_size(chunking.chunk_size)
        .with_region(region.region_start, region_end)
        .with_debug(debug);
    if let Some(workers) = chunking.workers {
        config = config.with_workers(workers);
    }
    if let Some(capacity) = chunking.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }
    config
}

fn run_ct(args: CtArgs, debug: bool) -> Result<()> {
    let reference = Reference::load(&args.profile)?;
    let config = correlation_config(&args.chunking, &args.region, &reference, debug)
        .with_min_coverage(args.min_coverage);

    let mut correlator = LagCorrelator::new(config).context("invalid correlation settings")?;
    if let Some((profile, filter)) = reference.class_filter(&args.profile) {
        correlator = correlator.with_class_filter(profile, filter);
    }

    let sites = open_sites(&args.input, &args.quality, reference.genome.clone())?;
    let result = correlator.run(sites).context("lag correlation failed")?;

    let delimiter = output_delimiter(args.output.as_deref());
    let mut writer = open_output(args.output.as_deref())?;
    write_report(&mut writer, &result.rows, delimiter).context("failed to write report")?;

    if let Some(path) = &args.pooled {
        let file = File::create(path)
            .with_context(|| format!("failed to create pooled output {}", path.display()))?;
        write_pooled(&mut BufWriter::new(file), &result.pooled, Delimiter::for_path(path))
            .context("failed to write pooled table")?;
    }

    Ok(())
}

fn run_cr(args: CrArgs, debug: bool) -> Result<()> {
    let reference = Reference::load(&args.profile)?;
    let config = correlation_config(&args.chunking, &args.region, &reference, debug);

    let mut correlator = RateCorrelator::new(config).context("invalid correlation settings")?;
    if let Some((profile, filter)) = reference.class_filter(&args.profile) {
        correlator = correlator.with_class_filter(profile, filter);
    }

    let sites = open_sites(&args.input, &args.quality, reference.genome.clone())?;
    let result = correlator.run(sites).context("diversity covariance failed")?;

    let delimiter = output_delimiter(args.output.as_deref());
    let mut writer = open_output(args.output.as_deref())?;
    write_rate_report(&mut writer, &result.rows, delimiter)
        .context("failed to write rate report")?;
    Ok(())
}

fn run_pi(args: PiArgs) -> Result<()> {
    let region = Region::new(args.region.region_start, args.region.region_end);
    let sites = open_sites(&args.input, &args.quality, None)?;

    let delimiter = output_delimiter(args.output.as_deref());
    let mut writer = DiversityWriter::new(open_output(args.output.as_deref())?, delimiter)?;

    for site in sites {
        let site = site.context("failed to read site")?;
        if !region.contains(site.position) {
            continue;
        }
        if let Some(diversity) = SiteDiversity::from_site(&site) {
            writer.write(&diversity)?;
        }
    }

    let rows = writer.finish()?;
    info!(rows, "diversity written");
    Ok(())
}

type SiteStream = Box<dyn Iterator<Item = Result<Site, InputError>>>;

fn open_sites(input: &Path, quality: &QualityArgs, genome: Option<Arc<[u8]>>) -> Result<SiteStream> {
    if input == Path::new("-") {
        let reader: Box<dyn BufRead> = Box::new(BufReader::new(io::stdin()));
        return Ok(Box::new(
            PileupReader::new(reader).with_min_base_quality(quality.min_base_quality),
        ));
    }

    let extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pileup") | Some("mpileup") => {
            let file = File::open(input)
                .with_context(|| format!("failed to open pileup {}", input.display()))?;
            Ok(Box::new(
                PileupReader::new(BufReader::new(file))
                    .with_min_base_quality(quality.min_base_quality),
            ))
        }
        Some("bam") | Some("sam") => {
            let filter = ReadFilter::new(quality.min_mapping_quality, quality.min_base_quality);
            let mut reader = BamSiteReader::from_path(input, filter)
                .with_context(|| format!("failed to open alignments {}", input.display()))?;
            if let Some(genome) = genome {
                reader = reader.with_reference_sequence(genome);
            }
            Ok(Box::new(reader))
        }
        _ => bail!(
            "cannot recognise input format of {}; expected .pileup, .mpileup, .bam or .sam",
            input.display()
        ),
    }
}

fn output_delimiter(path: Option<&Path>) -> Delimiter {
    path.map(Delimiter::for_path).unwrap_or_default()
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    })
}
