//! The run loop: gate, dedup, extract, persist, mark, wait, repeat.

use std::fmt;
use log::{debug, error, info};

use crate::cancel::CancellationSource;
use crate::config::Config;
use crate::delay_manager::{DelayCategory, DelayPolicy, WaitOutcome};
use crate::extractor::ExtractionPipeline;
use crate::persistence::PersistenceLayer;
use crate::profile::SectionName;
use crate::resume_manager::DedupStore;
use crate::session::{NavigationDriver, SectionLocator};
use crate::time_gate::{Clock, TimeGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    WindowClosed,
    Exhausted,
    Cancelled,
    Fatal,
}

impl HaltReason {
    pub fn exit_code(self) -> i32 {
        match self {
            HaltReason::WindowClosed | HaltReason::Exhausted => 0,
            HaltReason::Fatal => 1,
            HaltReason::Cancelled => 130,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HaltReason::WindowClosed => "window-closed",
            HaltReason::Exhausted => "exhausted",
            HaltReason::Cancelled => "cancelled",
            HaltReason::Fatal => "fatal-error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Halted(HaltReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets persisted and marked this run, partial ones included.
    pub processed: usize,
    /// Of `processed`, how many had at least one absent section.
    pub partial: usize,
    /// Already in the dedup store.
    pub skipped: usize,
    /// Attempted but not persisted.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub halt: HaltReason,
    pub summary: RunSummary,
    /// Cause of a fatal halt.
    pub cause: Option<String>,
}

/// Collaborators the orchestrator borrows for the length of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub locator: &'a dyn SectionLocator,
    pub clock: &'a dyn Clock,
    pub cancel: &'a dyn CancellationSource,
}

pub struct Orchestrator<'a> {
    gate: TimeGate,
    delays: DelayPolicy,
    pipeline: ExtractionPipeline,
    dedup: DedupStore,
    store: PersistenceLayer,
    with: Collaborators<'a>,
    max_profiles: Option<usize>,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &Config, dedup: DedupStore, store: PersistenceLayer, with: Collaborators<'a>) -> Self {
        Orchestrator {
            gate: TimeGate::new(&config.window),
            delays: DelayPolicy::new(&config.delays),
            pipeline: ExtractionPipeline::new(&config.delays),
            dedup,
            store,
            with,
            max_profiles: None,
            state: RunState::Idle,
        }
    }

    /// Stop with `Exhausted` once this many targets were processed in this run.
    pub fn with_max_profiles(mut self, max: Option<usize>) -> Self {
        self.max_profiles = max;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Walks `targets` in order with `driver`, which nothing else may touch
    /// until this returns.
    pub fn run(&mut self, targets: &[String], driver: &mut dyn NavigationDriver) -> RunReport {
        let mut summary = RunSummary::default();

        if let Some(reason) = self.gate.closed_reason(&self.with.clock.now()) {
            info!("Not starting: {}", reason);
            return self.halt(HaltReason::WindowClosed, summary, None);
        }

        self.state = RunState::Running;
        info!("Starting scraping session over {} targets", targets.len());

        let mut attempted = 0usize;
        for (i, target) in targets.iter().enumerate() {
            if self.with.cancel.is_requested() {
                info!("Cancellation requested before {}", target);
                return self.halt(HaltReason::Cancelled, summary, None);
            }

            if self.dedup.contains(target) {
                debug!("Profile already scraped, skipping: {}", target);
                summary.skipped += 1;
                continue;
            }

            if let Some(max) = self.max_profiles {
                if summary.processed >= max {
                    info!("Reached maximum profiles limit: {}", max);
                    return self.halt(HaltReason::Exhausted, summary, None);
                }
            }

            if attempted > 0 {
                if let Some(reason) = self.gate.closed_reason(&self.with.clock.now()) {
                    info!("Scraper stopped due to time constraints: {}", reason);
                    return self.halt(HaltReason::WindowClosed, summary, None);
                }
            }
            attempted += 1;

            let scraped_at = self.with.clock.now();
            let record = match self.pipeline.extract(driver, self.with.locator, target, scraped_at) {
                Ok(record) => record,
                Err(abort) => {
                    error!(
                        "Session unusable while scraping {}: {}. Dropping partial record ({} sections); it stays queued for the next run.",
                        target,
                        abort.error,
                        abort.partial.present_sections().len()
                    );
                    summary.failed += 1;
                    return self.halt(HaltReason::Fatal, summary, Some(abort.error.to_string()));
                }
            };

            if let Err(e) = self.store.append(&record) {
                error!("Failed to persist record for {}: {}", target, e);
                summary.failed += 1;
                return self.halt(HaltReason::Fatal, summary, Some(e.to_string()));
            }

            summary.processed += 1;
            if !record.is_complete() {
                summary.partial += 1;
            }

            if let Err(e) = self.dedup.record(target, scraped_at) {
                error!("Record for {} was saved but could not be marked processed: {}", target, e);
                return self.halt(HaltReason::Fatal, summary, Some(e.to_string()));
            }

            info!(
                "Successfully scraped profile: {} ({}/{} sections). Progress: {} scraped this run",
                record.display_name(),
                record.present_sections().len(),
                SectionName::ALL.len(),
                summary.processed
            );

            let more_pending = targets[i + 1..].iter().any(|t| !self.dedup.contains(t));
            let under_limit = self.max_profiles.map_or(true, |max| summary.processed < max);
            if more_pending && under_limit {
                if self.with.cancel.is_requested() {
                    info!("Cancellation requested after {}", target);
                    return self.halt(HaltReason::Cancelled, summary, None);
                }
                if self.delays.pause(DelayCategory::InterTarget, self.with.cancel) == WaitOutcome::Cancelled {
                    info!("Cancellation requested during inter-target delay");
                    return self.halt(HaltReason::Cancelled, summary, None);
                }
            }
        }

        info!("No targets remain");
        self.halt(HaltReason::Exhausted, summary, None)
    }

    fn halt(&mut self, reason: HaltReason, summary: RunSummary, cause: Option<String>) -> RunReport {
        self.state = RunState::Halted(reason);
        let line = format!(
            "Scraping session halted ({}): {} processed ({} partial), {} skipped, {} failed",
            reason, summary.processed, summary.partial, summary.skipped, summary.failed
        );
        match reason {
            HaltReason::Fatal => error!("{}", line),
            _ => info!("{}", line),
        }
        RunReport { halt: reason, summary, cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_normal_stops_from_failures() {
        assert_eq!(HaltReason::Exhausted.exit_code(), 0);
        assert_eq!(HaltReason::WindowClosed.exit_code(), 0);
        assert_eq!(HaltReason::Fatal.exit_code(), 1);
        assert_eq!(HaltReason::Cancelled.exit_code(), 130);
        assert_eq!(HaltReason::WindowClosed.to_string(), "window-closed");
    }
}
