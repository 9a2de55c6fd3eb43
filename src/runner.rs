use crate::aggregator::Aggregator;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::extractor::{self, ExtractError, Extraction};
use crate::geocode::{Lookup, Place, Resolver};
use crate::record::{CountryOutput, ImageRecord, RunOutput, RunSummary};
use crate::walker;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct FileStats {
    original_number_of_files: u64,
    files_with_extracted_exif: u64,
    extracted_exifs_with_errors: u64,
}

/// Drives one full run: walk, extract, resolve, aggregate, write.
///
/// With `reuse` set and both documents already on disk, the pipeline is
/// skipped and the existing documents are served unchanged.
pub async fn execute(config: &AppConfig, resolver: &mut Resolver, reuse: bool) -> Result<(), AppError> {
    if reuse && previous_outputs_exist(config) {
        log::info!(
            "Reusing previous results from {} and {}",
            config.run_output_file,
            config.country_output_file
        );
        return Ok(());
    }

    let started = Instant::now();
    let files = walker::collect_files(config)?;

    // Extraction stage: pure file reads, fanned out on the rayon pool.
    // Collect preserves input order, so scan order survives.
    log::info!("Extracting metadata from {} file(s)", files.len());
    let extracted: Vec<(PathBuf, Result<Extraction, ExtractError>)> = files
        .into_par_iter()
        .map(|path| {
            let outcome = extractor::extract(&path);
            (path, outcome)
        })
        .collect();

    let (stats, aggregator, errors) = process(extracted, resolver).await;

    resolver.persist_cache()?;

    let geocoder = resolver.stats();
    let (folders, country_output) = aggregator.into_outputs();
    let run_output = RunOutput {
        summary: RunSummary {
            total_running_time: format_duration(started.elapsed()),
            geocoder_calls: geocoder.calls,
            geocoder_errors: geocoder.errors,
            geocoder_timeouts: geocoder.timeouts,
            original_number_of_files: stats.original_number_of_files,
            files_with_extracted_exif: stats.files_with_extracted_exif,
            extracted_exifs_with_errors: stats.extracted_exifs_with_errors,
        },
        folders,
        errors,
    };

    write_outputs(config, &run_output, &country_output)?;
    log_summary(&run_output, &country_output);
    Ok(())
}

pub fn previous_outputs_exist(config: &AppConfig) -> bool {
    Path::new(&config.run_output_file).is_file() && Path::new(&config.country_output_file).is_file()
}

/// Per-file policy over the extraction outcomes, in scan order. Every failure
/// is recovered into an error string and a counter; nothing here aborts.
async fn process(
    extracted: Vec<(PathBuf, Result<Extraction, ExtractError>)>,
    resolver: &mut Resolver,
) -> (FileStats, Aggregator, Vec<String>) {
    let mut stats = FileStats::default();
    let mut aggregator = Aggregator::new();
    let mut errors = Vec::new();
    let mut current_folder = String::new();

    for (path, outcome) in extracted {
        stats.original_number_of_files += 1;
        let folder = folder_name(&path);
        if folder != current_folder {
            log::info!("Processing folder: {}", folder);
            current_folder = folder.clone();
        }

        match outcome {
            Err(e) => {
                log::warn!("Failed to extract metadata from {:?}: {}", path, e);
                errors.push(format!("{}: metadata extraction failed: {}", path.display(), e));
                stats.extracted_exifs_with_errors += 1;
            }
            // A readable image without a GPS tag is recorded, but counts
            // toward neither extraction counter.
            Ok(Extraction::Unlocated { captured_at }) => {
                aggregator.add(&folder, build_record(&path, captured_at, None, None));
            }
            Ok(Extraction::Located { coordinates, captured_at }) => {
                stats.files_with_extracted_exif += 1;
                let (lat, lon) = coordinates;
                let place = match resolver.resolve(lat, lon).await {
                    Ok(Lookup::Found(place)) => Some(place),
                    Ok(Lookup::NoMatch) => {
                        errors.push(format!(
                            "{}: no locality found for ({:.5}, {:.5})",
                            path.display(),
                            lat,
                            lon
                        ));
                        None
                    }
                    Err(e) => {
                        errors.push(format!(
                            "{}: geocoding ({:.5}, {:.5}) failed: {}",
                            path.display(),
                            lat,
                            lon,
                            e
                        ));
                        None
                    }
                };
                aggregator.add(&folder, build_record(&path, captured_at, Some(coordinates), place));
            }
        }
    }

    (stats, aggregator, errors)
}

fn build_record(
    path: &Path,
    captured_at: Option<NaiveDateTime>,
    coordinates: Option<(f64, f64)>,
    place: Option<Place>,
) -> ImageRecord {
    let (city, country) = match place {
        Some(place) => (place.city, place.country),
        None => (None, None),
    };
    ImageRecord {
        filename: file_name(path),
        date: captured_at.map(|dt| dt.date()),
        time: captured_at.map(|dt| dt.time()),
        coordinates,
        city,
        country,
    }
}

fn folder_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Writes both documents, or neither. Each is staged to a `.tmp` sibling and
/// only renamed into place once both writes have succeeded, so a viewer never
/// sees one half of a run.
fn write_outputs(
    config: &AppConfig,
    run_output: &RunOutput,
    country_output: &CountryOutput,
) -> Result<(), AppError> {
    let run_json = serde_json::to_string_pretty(run_output)?;
    let country_json = serde_json::to_string_pretty(country_output)?;

    let run_path = Path::new(&config.run_output_file);
    let country_path = Path::new(&config.country_output_file);
    for path in [run_path, country_path] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
    }

    let run_tmp = tmp_sibling(run_path);
    let country_tmp = tmp_sibling(country_path);
    fs::write(&run_tmp, run_json)?;
    if let Err(e) = fs::write(&country_tmp, country_json) {
        let _ = fs::remove_file(&run_tmp);
        return Err(e.into());
    }
    fs::rename(&run_tmp, run_path)?;
    fs::rename(&country_tmp, country_path)?;

    log::info!(
        "Wrote run results to {} and country summary to {}",
        config.run_output_file,
        config.country_output_file
    );
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(".tmp");
    PathBuf::from(staged)
}

fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

fn log_summary(run_output: &RunOutput, country_output: &CountryOutput) {
    let summary = &run_output.summary;
    log::info!(
        "Processed {} file(s) in {}: {} with metadata, {} failed",
        summary.original_number_of_files,
        summary.total_running_time,
        summary.files_with_extracted_exif,
        summary.extracted_exifs_with_errors
    );
    log::info!(
        "Geocoder: {} call(s), {} error(s), {} timeout(s)",
        summary.geocoder_calls,
        summary.geocoder_errors,
        summary.geocoder_timeouts
    );
    for country in &country_output.countries {
        match country.first_visit_date {
            Some(date) => log::info!("{} (first visit {})", country.name, date),
            None => log::info!("{}", country.name),
        }
        for city in &country.cities {
            log::info!("  {}: {} visit(s)", city.name, city.visits);
        }
    }
    if !run_output.errors.is_empty() {
        log::warn!("{} file(s) reported errors", run_output.errors.len());
    }
}
