//! CLI command implementations.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::Platform;
use crate::config::Settings;
use crate::keys::EventKeyGenerator;
use crate::models::{LemlistActivity, SmartleadEvent, SyncEvent};
use crate::rate_limit::{ServiceLimits, TokenLimiter};
use crate::sync::{BulkSyncEngine, SyncError, SyncOptions};

/// Read a JSON-lines export into normalized events.
fn read_events(path: &Path, platform: Platform) -> anyhow::Result<Vec<SyncEvent>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match platform {
            Platform::Lemlist => {
                let activity: LemlistActivity = serde_json::from_str(&line)
                    .with_context(|| format!("{}:{}", path.display(), index + 1))?;
                SyncEvent::from_lemlist(&activity)
            }
            Platform::Smartlead => {
                let raw: SmartleadEvent = serde_json::from_str(&line)
                    .with_context(|| format!("{}:{}", path.display(), index + 1))?;
                SyncEvent::from_smartlead(&raw)
            }
        };
        events.push(event);
    }
    Ok(events)
}

/// Import events from an export file, assigning idempotency keys.
pub async fn cmd_import(
    settings: &Settings,
    file: &Path,
    platform: Platform,
    service: Option<&str>,
    output: Option<&Path>,
    stop_on_error: bool,
) -> anyhow::Result<()> {
    let events = read_events(file, platform)?;
    if events.is_empty() {
        println!("{} no events in {}", style("!").yellow(), file.display());
        return Ok(());
    }

    let service = service.unwrap_or_else(|| platform.service_name());
    let limits = settings.limits_for(service);
    let engine = BulkSyncEngine::with_limiter(TokenLimiter::with_limits(service, limits));

    let output_path: PathBuf =
        output.map(Path::to_path_buf).unwrap_or_else(|| file.with_extension("keyed.jsonl"));
    let writer = Arc::new(Mutex::new(BufWriter::new(
        File::create(&output_path).with_context(|| format!("creating {}", output_path.display()))?,
    )));
    let generator = Arc::new(Mutex::new(EventKeyGenerator::with_capacity(
        settings.keys.max_cache_size,
    )));

    let total = events.len();
    println!(
        "Importing {} {} events via the {} profile",
        total,
        platform.service_name(),
        service
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let report = engine
        .run_all(
            events,
            "import",
            |batch| {
                let generator = Arc::clone(&generator);
                let writer = Arc::clone(&writer);
                let pb = pb.clone();
                async move {
                    let count = batch.len();
                    let mut generator = generator.lock().unwrap();
                    let mut writer = writer.lock().unwrap();
                    for mut event in batch {
                        event.key = Some(generator.for_sync_event(&event));
                        let line = serde_json::to_string(&event)
                            .map_err(|e| SyncError::Other(e.into()))?;
                        writeln!(writer, "{line}").map_err(|e| SyncError::Other(e.into()))?;
                    }
                    pb.inc(count as u64);
                    Ok::<usize, SyncError>(count)
                }
            },
            SyncOptions {
                max_retries: settings.sync.max_retries,
                stop_on_error: stop_on_error || settings.sync.stop_on_error,
            },
        )
        .await?;
    pb.finish_and_clear();

    writer
        .lock()
        .unwrap()
        .flush()
        .context("flushing output file")?;

    let stats = generator.lock().unwrap().stats();
    println!(
        "{} {}/{} events keyed to {} in {:.1}s ({:.1}% success)",
        style("✓").green(),
        report.summary.processed_items,
        report.summary.total_items,
        output_path.display(),
        report.summary.elapsed_secs,
        report.summary.success_rate,
    );
    if stats.collisions_detected > 0 || stats.invalid_inputs > 0 {
        println!(
            "  {} collisions, {} invalid inputs, {} synthesized ids",
            stats.collisions_detected, stats.invalid_inputs, stats.fallbacks_used
        );
    }
    if !report.summary.completed {
        println!(
            "{} {} events left unprocessed after {} failed batches",
            style("!").yellow(),
            report.remaining,
            report.queue.failed_batches
        );
    }

    Ok(())
}

/// Generate keys for an export without writing anything.
pub async fn cmd_keys(settings: &Settings, file: &Path, platform: Platform) -> anyhow::Result<()> {
    let events = read_events(file, platform)?;
    let mut generator = EventKeyGenerator::with_capacity(settings.keys.max_cache_size);

    for event in &events {
        let key = generator.for_sync_event(event);
        println!("{key}");
    }

    let stats = generator.stats();
    eprintln!(
        "{} {} keys generated, {} collisions ({:.2}% rate), {} invalid inputs",
        style("✓").green(),
        stats.total_generated,
        stats.collisions_detected,
        stats.collision_rate() * 100.0,
        stats.invalid_inputs,
    );
    Ok(())
}

/// Print effective rate and batch limits.
pub fn cmd_limits(settings: &Settings, service: Option<&str>) -> anyhow::Result<()> {
    let print_limits = |name: &str, limits: &ServiceLimits| {
        println!(
            "{:<12} {:>5} req/s  batch {:>3}-{:<3}  backoff x{}",
            name,
            limits.requests_per_second,
            limits.min_batch_size,
            limits.max_batch_size,
            limits.backoff_multiplier,
        );
    };

    match service {
        Some(name) => {
            let limits = settings.limits_for(name);
            print_limits(name, &limits);
        }
        None => {
            for name in ServiceLimits::known_services() {
                print_limits(name, &settings.limits_for(name));
            }
            // Configured services without a built-in profile.
            for name in settings.services.keys() {
                if !ServiceLimits::known_services().contains(&name.as_str()) {
                    print_limits(name, &settings.limits_for(name));
                }
            }
        }
    }
    Ok(())
}
