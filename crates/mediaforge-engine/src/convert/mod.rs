//! Cross-format conversion pipeline
//!
//! Copies one source image into a newly created destination image:
//! preflight compatibility checks, chunked sector copy (long or short),
//! tag transfer, subchannel reconstruction, and finalization. Data loss
//! is never silent: a tag the destination cannot store aborts the run
//! unless `force` is set, in which case it is logged and skipped.

pub mod subchannel;

use crate::progress::{ProgressCallback, ProgressEvent, RunControl};
use crate::walker::{ChunkPlan, Span, WalkLimits};
use mediaforge_core::{
    validate_track_list, Error, Geometry, ImageFormat, MediaImage, MediaTagKind, MediaView,
    Result, SectorTagKind, Track, WritableImage, RAW_SECTOR_SIZE,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use subchannel::{
    deinterleave, interleave, process_q, synthesize_frame, LbaExtents, QAnalysis, FRAME_SIZE,
};
use tracing::{debug, error, warn};

/// Options for one conversion run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Sectors per copy chunk
    pub chunk_size: u32,
    /// Continue past data-loss and write failures, logging them
    pub force: bool,
    /// Rewrite ADR-1 Q frames whose position disagrees with their LBA
    pub fix_subchannel_position: bool,
    /// Additionally regenerate structurally bad Q frames
    pub fix_subchannel: bool,
    /// Additionally recompute CRCs that are the only bad part of a frame
    pub fix_subchannel_crc: bool,
    /// Synthesize subchannel for LBAs that have none
    pub generate_subchannels: bool,
    /// Override the destination C/H/S geometry
    pub geometry: Option<Geometry>,
    /// Carry metadata and dump history over to the destination
    pub propagate_metadata: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            chunk_size: 64,
            force: false,
            fix_subchannel_position: false,
            fix_subchannel: false,
            fix_subchannel_crc: false,
            generate_subchannels: false,
            geometry: None,
            propagate_metadata: true,
        }
    }
}

impl ConvertOptions {
    /// Apply the fix-flag escalation: fixing CRCs implies fixing structure
    /// implies fixing position.
    fn normalized(&self) -> Self {
        let mut options = self.clone();
        if options.fix_subchannel_crc {
            options.fix_subchannel = true;
        }
        if options.fix_subchannel {
            options.fix_subchannel_position = true;
        }
        options
    }
}

/// What one conversion run did
#[derive(Debug, Clone, Default)]
pub struct ConvertSummary {
    /// Sectors (or blocks) copied
    pub sectors_copied: u64,
    /// Media tag kinds transferred
    pub media_tags_copied: usize,
    /// Sector tag kinds transferred
    pub sector_tags_copied: usize,
    /// Tags skipped under `force`, by name
    pub skipped_tags: Vec<String>,
    /// True when a long-sector size mismatch downgraded the run to short reads
    pub downgraded_long: bool,
    /// Q frames rewritten during subchannel reconstruction
    pub repaired_subchannel_frames: u64,
    /// LBAs whose subchannel was processed or synthesized
    pub subchannel: LbaExtents,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

struct CopyState {
    use_long: bool,
    downgraded: bool,
    sectors_copied: u64,
    done_units: u64,
    total_units: u64,
    start: Instant,
}

/// Convert a source image into a new image of the destination format.
///
/// Preconditions are checked before any byte is written; see the module
/// docs for the data-loss policy.
pub fn convert_media(
    source: &mut dyn MediaImage,
    destination: &dyn ImageFormat,
    out_path: &Path,
    options: &ConvertOptions,
    progress: Option<ProgressCallback>,
    control: &RunControl,
) -> Result<ConvertSummary> {
    let options = options.normalized();
    let start = Instant::now();
    let mut summary = ConvertSummary::default();

    // Preflight: nothing is written until all of this passes
    if out_path.exists() {
        return Err(Error::OutputExists(out_path.display().to_string()));
    }

    let info = source.info().clone();
    if !destination
        .supported_media_types()
        .contains(&info.media_type)
    {
        return Err(Error::IncompatibleMedia {
            format: destination.name().to_string(),
            media: info.media_type.to_string(),
        });
    }

    for kind in &info.readable_media_tags {
        if !destination.supported_media_tags().contains(kind) {
            if !options.force {
                return Err(Error::data_loss(format!("media tag {}", kind)));
            }
            warn!("{} will be lost, continuing as forced", kind);
            summary.skipped_tags.push(kind.name().to_string());
        }
    }
    for kind in &info.readable_sector_tags {
        if !destination.supported_sector_tags().contains(kind) {
            if !options.force {
                return Err(Error::data_loss(format!("sector tag {}", kind)));
            }
            warn!("{} will be lost, continuing as forced", kind);
            summary.skipped_tags.push(kind.name().to_string());
        }
    }

    let view = MediaView::resolve(source);
    debug!(
        view = view.kind(),
        sectors = info.sectors,
        media = %info.media_type,
        "starting conversion"
    );

    let mut dest = destination.create(out_path, info.media_type, info.sectors, info.sector_size)?;

    if !matches!(view, MediaView::Optical { .. } | MediaView::Tape { .. }) {
        if let Some(geometry) = options.geometry.or_else(|| source.geometry()) {
            if let Err(e) = dest.set_geometry(geometry) {
                warn!("destination rejected geometry {}: {}", geometry, e);
            }
        }
    }

    // Media tags the destination can store
    for kind in info
        .readable_media_tags
        .iter()
        .copied()
        .filter(|k| destination.supported_media_tags().contains(k))
    {
        match source.read_media_tag(kind) {
            Ok(data) => match dest.write_media_tag(kind, &data) {
                Ok(()) => summary.media_tags_copied += 1,
                Err(e) if options.force => warn!("could not store {}: {}", kind, e),
                Err(e) => return Err(e),
            },
            Err(Error::TagNotPresent(_)) => {}
            Err(e) if options.force => warn!("could not read {}: {}", kind, e),
            Err(e) => return Err(e),
        }
    }

    let mut state = CopyState {
        use_long: !info.readable_sector_tags.is_empty(),
        downgraded: false,
        sectors_copied: 0,
        done_units: 0,
        total_units: 0,
        start,
    };

    match &view {
        MediaView::Optical { tracks } => {
            let mut tracks = tracks.clone();
            validate_track_list(&tracks)?;
            // Destinations often pre-allocate per-track structures, so the
            // full track list goes in before any sector data.
            dest.set_tracks(&tracks)?;

            let plan = ChunkPlan::for_view(&view, WalkLimits::with_sectors(options.chunk_size), false);
            state.total_units = plan.total_units();
            copy_plan(source, dest.as_mut(), &plan, &mut state, &options, &progress, control)?;
            summary.sectors_copied = state.sectors_copied;

            transfer_optical_tags(
                source,
                dest.as_mut(),
                destination,
                &mut tracks,
                &info.readable_sector_tags,
                &options,
                control,
                &mut summary,
            )?;

            if options.generate_subchannels
                && info.media_type.is_cd()
                && destination
                    .supported_sector_tags()
                    .contains(&SectorTagKind::CdSectorSubchannel)
            {
                generate_missing_subchannel(dest.as_mut(), &tracks, &options, control, &mut summary)?;
            }
        }
        MediaView::Tape { files, partitions, .. } => {
            let plan = ChunkPlan::for_view(&view, WalkLimits::with_sectors(options.chunk_size), true);
            state.total_units = plan.total_units();
            copy_plan(source, dest.as_mut(), &plan, &mut state, &options, &progress, control)?;
            summary.sectors_copied = state.sectors_copied;

            transfer_flat_tags(
                source,
                dest.as_mut(),
                destination,
                info.sectors,
                &info.readable_sector_tags,
                &options,
                control,
                &mut summary,
            )?;

            for file in files {
                dest.add_file(*file)?;
            }
            for partition in partitions {
                dest.add_partition(*partition)?;
            }
        }
        MediaView::ByteAddressable { .. } | MediaView::Block { .. } => {
            let plan = ChunkPlan::for_view(
                &MediaView::Block { sectors: info.sectors },
                WalkLimits::with_sectors(options.chunk_size),
                false,
            );
            state.total_units = plan.total_units();
            copy_plan(source, dest.as_mut(), &plan, &mut state, &options, &progress, control)?;
            summary.sectors_copied = state.sectors_copied;

            transfer_flat_tags(
                source,
                dest.as_mut(),
                destination,
                info.sectors,
                &info.readable_sector_tags,
                &options,
                control,
                &mut summary,
            )?;
        }
    }

    summary.downgraded_long = state.downgraded;

    if options.propagate_metadata {
        let metadata = source.metadata();
        if !metadata.is_empty() {
            if let Err(e) = dest.set_metadata(&metadata) {
                warn!("destination rejected metadata: {}", e);
            }
        }
        for record in source.dump_records() {
            if let Err(e) = dest.add_dump_record(&record) {
                warn!("destination rejected dump record: {}", e);
            }
        }
    }

    if let Err(e) = dest.close() {
        // Sectors already written stay written; there is no rollback
        error!("closing destination failed: {}", e);
        return Err(e);
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Run the chunked sector copy for one plan
fn copy_plan(
    source: &mut dyn MediaImage,
    dest: &mut dyn WritableImage,
    plan: &ChunkPlan,
    state: &mut CopyState,
    options: &ConvertOptions,
    progress: &Option<ProgressCallback>,
    control: &RunControl,
) -> Result<()> {
    for span in plan.spans() {
        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Span::Sectors { start: position, count, .. } = *span else {
            return Err(Error::invalid_operation("byte spans cannot be converted"));
        };

        let mut data;
        if state.use_long {
            data = source.read_sectors_long(position, count)?;
            if data.len() as u64 % RAW_SECTOR_SIZE as u64 != 0 {
                if !options.force {
                    return Err(Error::SectorSizeMismatch {
                        lba: position,
                        expected: RAW_SECTOR_SIZE,
                        actual: data.len() as u64,
                    });
                }
                // Once downgraded the run never goes back to long reads
                warn!(
                    lba = position,
                    got = data.len(),
                    "long read size mismatch, downgrading to short sectors"
                );
                state.use_long = false;
                state.downgraded = true;
                data = source.read_sectors(position, count)?;
            }
        } else {
            data = source.read_sectors(position, count)?;
        }

        let written = if state.use_long {
            dest.write_sectors_long(position, count, &data)
        } else {
            dest.write_sectors(position, count, &data)
        };
        match written {
            Ok(()) => {}
            Err(e) if options.force => warn!("write failed at {}: {}", position, e),
            Err(e) => return Err(e),
        }

        state.sectors_copied += count as u64;
        state.done_units += count as u64;
        if let Some(callback) = progress {
            callback(&ProgressEvent::calculate(
                "Converting",
                state.done_units,
                Some(state.total_units),
                state.start,
            ));
        }
    }
    Ok(())
}

/// Transfer out-of-band tags for track-bounded media, reconstructing
/// subchannel along the way.
#[allow(clippy::too_many_arguments)]
fn transfer_optical_tags(
    source: &mut dyn MediaImage,
    dest: &mut dyn WritableImage,
    destination: &dyn ImageFormat,
    tracks: &mut [Track],
    readable: &[SectorTagKind],
    options: &ConvertOptions,
    control: &RunControl,
    summary: &mut ConvertSummary,
) -> Result<()> {
    let supported = destination.supported_sector_tags();
    let wanted: Vec<SectorTagKind> = readable
        .iter()
        .copied()
        .filter(|kind| !kind.is_inline() && supported.contains(kind))
        .collect();

    let mut flags: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    let mut isrcs: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    let mut mcn: Option<String> = None;

    for kind in &wanted {
        match kind {
            SectorTagKind::CdTrackFlags | SectorTagKind::CdTrackIsrc => {
                for track in tracks.iter() {
                    match source.read_track_tag(track.sequence, *kind) {
                        Ok(data) => {
                            if *kind == SectorTagKind::CdTrackFlags {
                                flags.insert(track.sequence, data);
                            } else {
                                isrcs.insert(track.sequence, data);
                            }
                        }
                        Err(Error::TagNotPresent(_)) => {}
                        Err(e) if options.force => {
                            warn!("could not read {} for track {}: {}", kind, track.sequence, e)
                        }
                        Err(e) => return Err(e),
                    }
                }
                summary.sector_tags_copied += 1;
            }
            SectorTagKind::CdSectorSubchannel => {
                reconstruct_subchannel(
                    source, dest, tracks, options, control, &mut isrcs, &mut mcn, summary,
                )?;
                summary.sector_tags_copied += 1;
            }
            other => {
                for track in tracks.iter() {
                    copy_tag_range(
                        source,
                        dest,
                        *other,
                        track.start_sector,
                        track.end_sector,
                        options,
                        control,
                    )?;
                }
                summary.sector_tags_copied += 1;
            }
        }
    }

    // Aggregated per-track scalars and the disc MCN go in last
    for (sequence, data) in &flags {
        match dest.write_track_tag(*sequence, SectorTagKind::CdTrackFlags, data) {
            Ok(()) => {}
            Err(e) if options.force => warn!("could not store flags for {}: {}", sequence, e),
            Err(e) => return Err(e),
        }
    }
    if supported.contains(&SectorTagKind::CdTrackIsrc) {
        for (sequence, data) in &isrcs {
            match dest.write_track_tag(*sequence, SectorTagKind::CdTrackIsrc, data) {
                Ok(()) => {}
                Err(e) if options.force => warn!("could not store ISRC for {}: {}", sequence, e),
                Err(e) => return Err(e),
            }
        }
    }
    if let Some(mcn) = mcn {
        if destination
            .supported_media_tags()
            .contains(&MediaTagKind::CdMcn)
        {
            match dest.write_media_tag(MediaTagKind::CdMcn, mcn.as_bytes()) {
                Ok(()) => {}
                Err(e) if options.force => warn!("could not store MCN: {}", e),
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

/// Deinterleave, validate, optionally repair, and store subchannel per
/// track. Index discoveries mutate the track list; each mutation bumps the
/// list generation, which is re-pushed before any further write.
#[allow(clippy::too_many_arguments)]
fn reconstruct_subchannel(
    source: &mut dyn MediaImage,
    dest: &mut dyn WritableImage,
    tracks: &mut [Track],
    options: &ConvertOptions,
    control: &RunControl,
    isrcs: &mut BTreeMap<u32, Vec<u8>>,
    mcn: &mut Option<String>,
    summary: &mut ConvertSummary,
) -> Result<()> {
    let mut generation = 0u32;
    let mut pushed_generation = 0u32;

    for index in 0..tracks.len() {
        let track = tracks[index].clone();
        let mut position = track.start_sector;

        while position <= track.end_sector {
            if control.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let count =
                (track.end_sector - position + 1).min(options.chunk_size as u64) as u32;
            let mut stream =
                source.read_sector_tag(position, count, SectorTagKind::CdSectorSubchannel)?;
            if stream.len() != count as usize * FRAME_SIZE {
                return Err(Error::invalid_image(format!(
                    "subchannel stream for {} sectors is {} bytes",
                    count,
                    stream.len()
                )));
            }

            for i in 0..count as usize {
                let lba = position + i as u64;
                if summary.subchannel.contains(lba) {
                    continue;
                }

                let mut raw = [0u8; FRAME_SIZE];
                raw.copy_from_slice(&stream[i * FRAME_SIZE..(i + 1) * FRAME_SIZE]);
                let mut packed = deinterleave(&raw);
                let mut q = [0u8; 12];
                q.copy_from_slice(&packed[12..24]);

                match process_q(
                    &mut q,
                    &track,
                    lba,
                    options.fix_subchannel_position,
                    options.fix_subchannel,
                    options.fix_subchannel_crc,
                ) {
                    QAnalysis::Valid { position: decoded, mcn: seen_mcn, isrc } => {
                        if let Some(seen) = seen_mcn {
                            // Last track to report a catalogue number wins
                            *mcn = Some(seen);
                        }
                        if let Some(isrc) = isrc {
                            isrcs
                                .entry(track.sequence)
                                .or_insert_with(|| isrc.into_bytes());
                        }
                        if let Some(decoded) = decoded {
                            if decoded.track as u32 == track.sequence
                                && track_index_update(
                                    &mut tracks[index],
                                    decoded.index,
                                    lba,
                                )
                            {
                                generation += 1;
                            }
                        }
                    }
                    QAnalysis::Repaired => {
                        summary.repaired_subchannel_frames += 1;
                        packed[12..24].copy_from_slice(&q);
                        let repaired = interleave(&packed);
                        stream[i * FRAME_SIZE..(i + 1) * FRAME_SIZE].copy_from_slice(&repaired);
                    }
                    QAnalysis::Untouched => {}
                }

                summary.subchannel.insert(lba);
            }

            if generation != pushed_generation {
                dest.set_tracks(tracks)?;
                pushed_generation = generation;
            }

            match dest.write_sector_tag(position, count, SectorTagKind::CdSectorSubchannel, &stream)
            {
                Ok(()) => {}
                Err(e) if options.force => warn!("could not store subchannel at {}: {}", position, e),
                Err(e) => return Err(e),
            }

            position += count as u64;
        }
    }

    Ok(())
}

/// Record a newly observed index start; true when the table changed
fn track_index_update(track: &mut Track, index: u8, lba: u64) -> bool {
    match track.indexes.entry(index as u16) {
        Entry::Vacant(entry) => {
            entry.insert(lba as i64);
            true
        }
        Entry::Occupied(mut entry) => {
            if *entry.get() > lba as i64 {
                entry.insert(lba as i64);
                true
            } else {
                false
            }
        }
    }
}

/// Synthesize subchannel for every LBA the reconstruction did not reach
fn generate_missing_subchannel(
    dest: &mut dyn WritableImage,
    tracks: &[Track],
    options: &ConvertOptions,
    control: &RunControl,
    summary: &mut ConvertSummary,
) -> Result<()> {
    for track in tracks {
        let mut run_start: Option<u64> = None;
        let mut frames: Vec<u8> = Vec::new();

        let mut flush = |dest: &mut dyn WritableImage,
                         run_start: &mut Option<u64>,
                         frames: &mut Vec<u8>,
                         extent: &mut LbaExtents|
         -> Result<()> {
            if let Some(start) = run_start.take() {
                let count = (frames.len() / FRAME_SIZE) as u32;
                dest.write_sector_tag(start, count, SectorTagKind::CdSectorSubchannel, frames)?;
                extent.insert_range(start, start + count as u64 - 1);
                frames.clear();
            }
            Ok(())
        };

        for lba in track.start_sector..=track.end_sector {
            if summary.subchannel.contains(lba) {
                flush(dest, &mut run_start, &mut frames, &mut summary.subchannel)?;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(lba);
            }
            frames.extend_from_slice(&synthesize_frame(track, lba));
            if frames.len() / FRAME_SIZE >= options.chunk_size as usize {
                flush(dest, &mut run_start, &mut frames, &mut summary.subchannel)?;
                if control.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }
        }
        flush(dest, &mut run_start, &mut frames, &mut summary.subchannel)?;
    }
    Ok(())
}

/// Transfer out-of-band tags for unsegmented media with a whole-range copy
#[allow(clippy::too_many_arguments)]
fn transfer_flat_tags(
    source: &mut dyn MediaImage,
    dest: &mut dyn WritableImage,
    destination: &dyn ImageFormat,
    sectors: u64,
    readable: &[SectorTagKind],
    options: &ConvertOptions,
    control: &RunControl,
    summary: &mut ConvertSummary,
) -> Result<()> {
    if sectors == 0 {
        return Ok(());
    }
    let supported = destination.supported_sector_tags();
    for kind in readable
        .iter()
        .copied()
        .filter(|kind| !kind.is_inline() && !kind.is_track_scalar() && supported.contains(kind))
    {
        copy_tag_range(source, dest, kind, 0, sectors - 1, options, control)?;
        summary.sector_tags_copied += 1;
    }
    Ok(())
}

/// Chunked copy of one ranged sector tag
fn copy_tag_range(
    source: &mut dyn MediaImage,
    dest: &mut dyn WritableImage,
    kind: SectorTagKind,
    start: u64,
    end: u64,
    options: &ConvertOptions,
    control: &RunControl,
) -> Result<()> {
    let mut position = start;
    while position <= end {
        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let count = (end - position + 1).min(options.chunk_size as u64) as u32;
        match source.read_sector_tag(position, count, kind) {
            Ok(data) => match dest.write_sector_tag(position, count, kind, &data) {
                Ok(()) => {}
                Err(e) if options.force => warn!("could not store {} at {}: {}", kind, position, e),
                Err(e) => return Err(e),
            },
            Err(Error::TagNotPresent(_)) => return Ok(()),
            Err(e) if options.force => {
                warn!("could not read {} at {}: {}", kind, position, e);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        position += count as u64;
    }
    Ok(())
}
