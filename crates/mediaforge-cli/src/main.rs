//! MediaForge CLI - inspect, checksum, convert, and verify media images

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mediaforge_core::{Geometry, ImageFormat, MediaImage, MediaView};
use mediaforge_engine::checksum::{checksum_media, ChecksumKind, ChecksumOptions, ChecksumSet};
use mediaforge_engine::convert::{convert_media, ConvertOptions};
use mediaforge_engine::progress::{ProgressEvent, RunControl};
use mediaforge_engine::verify::{verify_image, verify_sectors, ExitStatus, VerificationStatus};
use mediaforge_engine::walker::{SegmentId, WalkLimits};
use mediaforge_formats::Registry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(about = "Preserve, convert, and verify media images", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about an image
    Info {
        /// Image file
        image: PathBuf,
    },

    /// List known image formats
    Formats,

    /// Compute whole-media and per-segment checksums
    Checksum {
        /// Image file
        image: PathBuf,

        /// Algorithm to compute (repeatable); default is all of them
        #[arg(long = "algorithm", short = 'a', value_name = "NAME")]
        algorithms: Vec<String>,

        /// Skip the whole-media digest
        #[arg(long)]
        no_whole: bool,

        /// Also emit per-track/per-file digests
        #[arg(long)]
        per_segment: bool,

        /// Sectors per chunk
        #[arg(long, default_value_t = 256)]
        chunk_size: u32,
    },

    /// Convert an image to another format
    Convert {
        /// Source image
        input: PathBuf,

        /// Destination path
        output: PathBuf,

        /// Destination format: an extension, id, or name.
        /// Defaults to the output path's extension.
        #[arg(long, short = 'f', value_name = "SPEC")]
        format: Option<String>,

        /// Continue past data-loss and write failures
        #[arg(long)]
        force: bool,

        /// Rewrite Q frames whose position disagrees with their LBA
        #[arg(long)]
        fix_subchannel_position: bool,

        /// Also regenerate structurally bad Q frames
        #[arg(long)]
        fix_subchannel: bool,

        /// Also recompute CRCs that are the only bad part of a frame
        #[arg(long)]
        fix_subchannel_crc: bool,

        /// Synthesize subchannel for LBAs that have none
        #[arg(long)]
        generate_subchannels: bool,

        /// Override destination geometry, as C/H/S (e.g. 80/2/18)
        #[arg(long, value_name = "C/H/S")]
        geometry: Option<String>,

        /// Sectors per chunk
        #[arg(long, default_value_t = 64)]
        chunk_size: u32,
    },

    /// Verify an image and its sectors
    Verify {
        /// Image file
        image: PathBuf,

        /// Only run the whole-image check
        #[arg(long, conflicts_with = "sectors_only")]
        image_only: bool,

        /// Only run the per-sector check
        #[arg(long)]
        sectors_only: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn progress_printer(quiet: bool) -> Option<mediaforge_engine::progress::ProgressCallback> {
    if quiet {
        return None;
    }
    Some(Arc::new(|event: &ProgressEvent| {
        eprint!("\r{}        ", event.format());
        if event.total == Some(event.current) {
            eprintln!();
        }
    }))
}

fn run(cli: Cli) -> Result<i32> {
    let registry = Registry::with_builtin();

    match cli.command {
        Commands::Info { image } => {
            let mut image = registry
                .open(&image)
                .with_context(|| format!("opening {}", image.display()))?;

            println!("Format:      {}", image.identify());
            let info = image.info().clone();
            println!("Media type:  {}", info.media_type);
            println!("Sectors:     {}", info.sectors);
            println!("Sector size: {} bytes", info.sector_size);
            if let Some(geometry) = image.geometry() {
                println!("Geometry:    {}", geometry);
            }
            if !info.readable_media_tags.is_empty() {
                let names: Vec<&str> =
                    info.readable_media_tags.iter().map(|t| t.name()).collect();
                println!("Media tags:  {}", names.join(", "));
            }
            if !info.readable_sector_tags.is_empty() {
                let names: Vec<&str> =
                    info.readable_sector_tags.iter().map(|t| t.name()).collect();
                println!("Sector tags: {}", names.join(", "));
            }

            let view = MediaView::resolve(image.as_mut());
            println!("Topology:    {}", view.kind());
            if let MediaView::Optical { tracks } = &view {
                println!();
                for track in tracks {
                    println!("  {}", track);
                }
            }
            Ok(0)
        }

        Commands::Formats => {
            println!("{:<20} {:<6} {:<9} EXTENSIONS", "NAME", "ID", "WRITABLE");
            for (name, id, extensions, writable) in registry.supported_formats() {
                println!(
                    "{:<20} {:<6} {:<9} {}",
                    name,
                    id,
                    if writable { "yes" } else { "no" },
                    extensions.join(", ")
                );
            }
            Ok(0)
        }

        Commands::Checksum { image, algorithms, no_whole, per_segment, chunk_size } => {
            let set = if algorithms.is_empty() {
                ChecksumSet::all()
            } else {
                let mut set = ChecksumSet::new();
                for name in &algorithms {
                    let kind = ChecksumKind::from_name(name)
                        .with_context(|| format!("unknown algorithm '{}'", name))?;
                    set.insert(kind);
                }
                set
            };

            let mut image = registry
                .open(&image)
                .with_context(|| format!("opening {}", image.display()))?;

            let options = ChecksumOptions {
                set,
                whole_media: !no_whole,
                per_segment,
                limits: WalkLimits::with_sectors(chunk_size),
            };
            let report = checksum_media(
                image.as_mut(),
                &options,
                progress_printer(cli.quiet),
                &RunControl::new(),
            )?;

            for segment in &report.segments {
                let label = match segment.segment {
                    SegmentId::Track(sequence) => format!("Track {}", sequence),
                    SegmentId::File(file) => format!("File {}", file),
                };
                for digest in &segment.digests {
                    println!("{}: {} = {}", label, digest.kind.name(), digest.value);
                }
            }
            if let Some(digests) = &report.whole_media {
                for digest in digests {
                    println!("Media: {} = {}", digest.kind.name(), digest.value);
                }
            }
            Ok(0)
        }

        Commands::Convert {
            input,
            output,
            format,
            force,
            fix_subchannel_position,
            fix_subchannel,
            fix_subchannel_crc,
            generate_subchannels,
            geometry,
            chunk_size,
        } => {
            let spec = match format {
                Some(spec) => spec,
                None => output
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_string())
                    .context("output has no extension; pass --format")?,
            };
            let destination = registry.find_writable(&spec)?;

            let mut source = registry
                .open(&input)
                .with_context(|| format!("opening {}", input.display()))?;

            let options = ConvertOptions {
                chunk_size,
                force,
                fix_subchannel_position,
                fix_subchannel,
                fix_subchannel_crc,
                generate_subchannels,
                geometry: geometry.as_deref().map(parse_geometry).transpose()?,
                propagate_metadata: true,
            };

            let summary = convert_media(
                source.as_mut(),
                destination.as_ref(),
                &output,
                &options,
                progress_printer(cli.quiet),
                &RunControl::new(),
            )?;

            println!(
                "Converted {} sectors to {} in {:.1}s",
                summary.sectors_copied,
                destination.name(),
                summary.elapsed.as_secs_f64()
            );
            if summary.media_tags_copied + summary.sector_tags_copied > 0 {
                println!(
                    "Transferred {} media tag(s), {} sector tag(s)",
                    summary.media_tags_copied, summary.sector_tags_copied
                );
            }
            if summary.repaired_subchannel_frames > 0 {
                println!(
                    "Repaired {} subchannel frame(s)",
                    summary.repaired_subchannel_frames
                );
            }
            if summary.downgraded_long {
                println!("Long sector copy was downgraded to user data mid-run");
            }
            for tag in &summary.skipped_tags {
                println!("Skipped: {}", tag);
            }
            Ok(0)
        }

        Commands::Verify { image, image_only, sectors_only } => {
            let mut image = registry
                .open(&image)
                .with_context(|| format!("opening {}", image.display()))?;

            let image_status = if sectors_only {
                VerificationStatus::NotApplicable
            } else {
                verify_image(image.as_mut())?
            };

            let sector_status = if image_only {
                VerificationStatus::NotApplicable
            } else {
                let result = verify_sectors(
                    image.as_mut(),
                    None,
                    progress_printer(cli.quiet),
                    &RunControl::new(),
                )?;
                if !result.failing_lbas.is_empty() {
                    println!("{} sector(s) FAILED:", result.failing_lbas.len());
                    for lba in &result.failing_lbas {
                        println!("  LBA {}", lba);
                    }
                }
                if !result.unknown_lbas.is_empty() {
                    println!(
                        "{} sector(s) carry nothing to verify",
                        result.unknown_lbas.len()
                    );
                }
                result.status()
            };

            println!("Image:   {}", status_name(image_status));
            println!("Sectors: {}", status_name(sector_status));

            let exit = ExitStatus::classify(image_status, sector_status);
            println!("Result:  {:?}", exit);
            Ok(exit.code())
        }
    }
}

fn status_name(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Correct => "correct",
        VerificationStatus::Incorrect => "INCORRECT",
        VerificationStatus::NotApplicable => "not verifiable",
    }
}

fn parse_geometry(spec: &str) -> Result<Geometry> {
    let parts: Vec<&str> = spec.split('/').collect();
    if parts.len() != 3 {
        bail!("geometry must be C/H/S, e.g. 80/2/18");
    }
    let cylinders = parts[0].parse().context("bad cylinder count")?;
    let heads = parts[1].parse().context("bad head count")?;
    let sectors = parts[2].parse().context("bad sectors-per-track")?;
    Ok(Geometry::new(cylinders, heads, sectors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geometry() {
        let geometry = parse_geometry("80/2/18").unwrap();
        assert_eq!(geometry, Geometry::new(80, 2, 18));
        assert!(parse_geometry("80/2").is_err());
        assert!(parse_geometry("a/b/c").is_err());
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
