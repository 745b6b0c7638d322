//! CLI implementation for mural restoration

use crate::{
    config::{MaskConfig, ProcessorConfigBuilder, TileConfig},
    dataset::{DatasetConfig, DatasetGenerator},
    edge::EdgeMapExtractor,
    error::{Result, RestoreError},
    inference::IdentityBackend,
    masking::RegionMaskGenerator,
    processor::RestorationProcessor,
    services::{ConsoleProgressReporter, ImageIOService},
    tracing_config::init_cli_tracing,
    types::RegionBox,
};
use clap::{Args, Parser, Subcommand};
use instant::Instant;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "mural-restore")]
pub struct Cli {
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Restore marked regions of an image through the patch pipeline
    Restore(RestoreArgs),
    /// Generate a patch training dataset from a directory of images
    Gendataset(GendatasetArgs),
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Input image path
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output image path (PNG)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Damage region as X1,Y1,X2,Y2 (repeatable)
    #[arg(short, long = "region", value_name = "X1,Y1,X2,Y2")]
    pub regions: Vec<String>,

    /// Also write the generated mask to this path
    #[arg(long, value_name = "PATH")]
    pub mask_out: Option<PathBuf>,

    /// Also write the edge map to this path
    #[arg(long, value_name = "PATH")]
    pub edge_out: Option<PathBuf>,

    /// Patch size in pixels
    #[arg(long, default_value_t = 512)]
    pub tile_size: u32,

    /// Patch stride in pixels
    #[arg(long, default_value_t = 256)]
    pub tile_stride: u32,

    /// Keep mask fragments below the minimum-area threshold
    #[arg(long)]
    pub keep_small: bool,
}

#[derive(Args)]
pub struct GendatasetArgs {
    /// Directory of source images
    #[arg(value_name = "INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Output dataset directory
    #[arg(short, long, value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Patch size in pixels
    #[arg(long, default_value_t = 512)]
    pub tile_size: u32,

    /// Patch stride in pixels
    #[arg(long, default_value_t = 256)]
    pub tile_stride: u32,

    /// Extra augmented copies per training patch
    #[arg(long, default_value_t = 0)]
    pub augment: usize,

    /// RNG seed for reproducible masks and splits
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Parse a region argument of the form `X1,Y1,X2,Y2`
fn parse_region(value: &str) -> Result<RegionBox> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(RestoreError::invalid_config(format!(
            "region '{}' must have four comma-separated coordinates",
            value
        )));
    }
    let mut coords = [0i64; 4];
    for (slot, part) in coords.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| {
            RestoreError::invalid_config(format!("region coordinate '{}' is not an integer", part))
        })?;
    }
    Ok(RegionBox::new(coords[0], coords[1], coords[2], coords[3]))
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose)?;

    match cli.command {
        Command::Restore(args) => run_restore(&args, cli.verbose),
        Command::Gendataset(args) => run_gendataset(&args),
    }
}

fn run_restore(args: &RestoreArgs, verbose: u8) -> Result<()> {
    if args.regions.is_empty() {
        return Err(RestoreError::invalid_config(
            "at least one --region is required",
        ));
    }
    let boxes = args
        .regions
        .iter()
        .map(|r| parse_region(r))
        .collect::<Result<Vec<_>>>()?;

    let config = ProcessorConfigBuilder::new()
        .tile(TileConfig {
            size: args.tile_size,
            stride: args.tile_stride,
        })
        .mask(MaskConfig {
            keep_small: args.keep_small,
            ..MaskConfig::default()
        })
        .build()?;

    info!("Loading {}", args.input.display());
    let image = ImageIOService::load(&args.input)?;

    if let Some(mask_path) = &args.mask_out {
        let mask = RegionMaskGenerator::generate(&image, &boxes, &config.mask)?;
        ImageIOService::save_gray(&mask, mask_path)?;
        info!("Wrote mask to {}", mask_path.display());
    }
    if let Some(edge_path) = &args.edge_out {
        let edge = EdgeMapExtractor::extract(&image, &config.edge);
        ImageIOService::save_gray(&edge, edge_path)?;
        info!("Wrote edge map to {}", edge_path.display());
    }

    let start_time = Instant::now();
    let mut processor =
        RestorationProcessor::new(config, Box::new(IdentityBackend::new()))?;
    let result = processor.process_with_reporter(
        &image,
        &boxes,
        Box::new(ConsoleProgressReporter::new(verbose >= 1)),
    )?;
    result.save_png(&args.output)?;

    info!(
        "Processed {} patches in {:.2}s, wrote {}",
        result.patch_count,
        start_time.elapsed().as_secs_f64(),
        args.output.display()
    );
    Ok(())
}

fn run_gendataset(args: &GendatasetArgs) -> Result<()> {
    let config = DatasetConfig {
        tile: TileConfig {
            size: args.tile_size,
            stride: args.tile_stride,
        },
        augment_times: args.augment,
        seed: args.seed,
        ..DatasetConfig::default()
    };
    let mut generator = DatasetGenerator::new(config)?;

    let start_time = Instant::now();
    let summary = generator.generate(&args.input_dir, &args.output_dir)?;
    info!(
        "Wrote {} patches (train {}, val {}, test {}) in {:.2}s",
        summary.total(),
        summary.train,
        summary.val,
        summary.test,
        start_time.elapsed().as_secs_f64()
    );
    if summary.skipped_images > 0 {
        info!(
            "Skipped {} images smaller than one tile",
            summary.skipped_images
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region_valid() {
        let region = parse_region("50, 50, 300, 300").unwrap();
        assert_eq!(region, RegionBox::new(50, 50, 300, 300));
    }

    #[test]
    fn test_parse_region_normalizes_corner_order() {
        let region = parse_region("300,300,50,50").unwrap();
        assert_eq!(region, RegionBox::new(50, 50, 300, 300));
    }

    #[test]
    fn test_parse_region_rejects_malformed() {
        assert!(parse_region("50,50,300").is_err());
        assert!(parse_region("a,b,c,d").is_err());
        assert!(parse_region("").is_err());
    }

    #[test]
    fn test_cli_parses_restore_command() {
        let cli = Cli::parse_from([
            "mural-restore",
            "restore",
            "input.png",
            "-o",
            "out.png",
            "-r",
            "10,10,200,200",
            "-r",
            "300,300,400,400",
            "--tile-size",
            "256",
            "--tile-stride",
            "128",
        ]);
        match cli.command {
            Command::Restore(args) => {
                assert_eq!(args.regions.len(), 2);
                assert_eq!(args.tile_size, 256);
                assert_eq!(args.tile_stride, 128);
                assert!(!args.keep_small);
            },
            Command::Gendataset(_) => panic!("expected restore command"),
        }
    }

    #[test]
    fn test_cli_parses_gendataset_command() {
        let cli = Cli::parse_from([
            "mural-restore",
            "gendataset",
            "sources/",
            "-o",
            "dataset/",
            "--augment",
            "2",
            "--seed",
            "9",
        ]);
        match cli.command {
            Command::Gendataset(args) => {
                assert_eq!(args.augment, 2);
                assert_eq!(args.seed, Some(9));
            },
            Command::Restore(_) => panic!("expected gendataset command"),
        }
    }
}
