use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use rand::Rng;
use log::{debug, info};

use crate::cancel::CancellationSource;

/// Longest single sleep between cancellation polls.
const POLL_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayCategory {
    InterTarget,
    Scroll,
    Interaction,
}

impl DelayCategory {
    pub const ALL: [DelayCategory; 3] = [DelayCategory::InterTarget, DelayCategory::Scroll, DelayCategory::Interaction];

    pub fn name(self) -> &'static str {
        match self {
            DelayCategory::InterTarget => "inter-target",
            DelayCategory::Scroll => "scroll",
            DelayCategory::Interaction => "interaction",
        }
    }

    pub fn env_key(self) -> &'static str {
        match self {
            DelayCategory::InterTarget => "SCRAPER_DELAY_INTER_TARGET",
            DelayCategory::Scroll => "SCRAPER_DELAY_SCROLL",
            DelayCategory::Interaction => "SCRAPER_DELAY_INTERACTION",
        }
    }
}

impl fmt::Display for DelayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive `[min, max]` wait bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBounds {
    pub min: Duration,
    pub max: Duration,
}

impl DelayBounds {
    pub fn new(min: Duration, max: Duration) -> Option<Self> {
        if min > max {
            return None;
        }
        Some(DelayBounds { min, max })
    }

    pub fn from_secs(min: u64, max: u64) -> Option<Self> {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    const fn secs(min: u64, max: u64) -> Self {
        DelayBounds { min: Duration::from_secs(min), max: Duration::from_secs(max) }
    }
}

#[derive(Debug, Clone)]
pub struct DelaySpec {
    bounds: HashMap<DelayCategory, DelayBounds>,
}

impl Default for DelaySpec {
    fn default() -> Self {
        let mut bounds = HashMap::new();
        bounds.insert(DelayCategory::InterTarget, DelayBounds::secs(60, 600));
        bounds.insert(DelayCategory::Scroll, DelayBounds::secs(1, 3));
        bounds.insert(DelayCategory::Interaction, DelayBounds::secs(2, 5));
        DelaySpec { bounds }
    }
}

impl DelaySpec {
    /// Every category waits zero seconds. Used by tests and dry runs.
    pub fn immediate() -> Self {
        let mut spec = DelaySpec::default();
        for category in DelayCategory::ALL {
            spec.set(category, DelayBounds::secs(0, 0));
        }
        spec
    }

    pub fn set(&mut self, category: DelayCategory, bounds: DelayBounds) {
        self.bounds.insert(category, bounds);
    }

    pub fn bounds(&self, category: DelayCategory) -> DelayBounds {
        // Every category is seeded in `default`, so the fallback never fires.
        self.bounds.get(&category).copied().unwrap_or(DelayBounds::secs(0, 0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Cancelled,
}

pub struct DelayPolicy {
    spec: DelaySpec,
}

impl DelayPolicy {
    pub fn new(spec: &DelaySpec) -> Self {
        DelayPolicy { spec: spec.clone() }
    }

    /// Uniform sample from the category's inclusive bounds, at millisecond resolution.
    pub fn next_delay(&self, category: DelayCategory) -> Duration {
        let bounds = self.spec.bounds(category);
        let min = bounds.min.as_millis() as u64;
        let max = bounds.max.as_millis() as u64;
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min..=max))
    }

    /// Draws a delay for `category` and sleeps it out, polling `cancel` between slices.
    pub fn pause(&self, category: DelayCategory, cancel: &dyn CancellationSource) -> WaitOutcome {
        let delay = self.next_delay(category);
        match category {
            DelayCategory::InterTarget => info!("Waiting for {} seconds ({} delay)...", delay.as_secs(), category),
            _ => debug!("Waiting {} ms ({} delay)", delay.as_millis(), category),
        }
        sleep_interruptibly(delay, cancel)
    }
}

pub fn sleep_interruptibly(total: Duration, cancel: &dyn CancellationSource) -> WaitOutcome {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_requested() {
            return WaitOutcome::Cancelled;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::Completed;
        }
        thread::sleep((deadline - now).min(POLL_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancellationFlag, NeverCancel};
    use std::collections::HashSet;

    #[test]
    fn inter_target_samples_stay_in_bounds_and_vary() {
        let policy = DelayPolicy::new(&DelaySpec::default());
        let lower = Duration::from_secs(60);
        let upper = Duration::from_secs(600);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let d = policy.next_delay(DelayCategory::InterTarget);
            assert!(d >= lower && d <= upper, "{:?} out of bounds", d);
            seen.insert(d);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn default_short_categories() {
        let spec = DelaySpec::default();
        assert_eq!(spec.bounds(DelayCategory::Scroll), DelayBounds::from_secs(1, 3).unwrap());
        assert_eq!(spec.bounds(DelayCategory::Interaction), DelayBounds::from_secs(2, 5).unwrap());
    }

    #[test]
    fn degenerate_bounds_return_exact_value() {
        let mut spec = DelaySpec::default();
        spec.set(DelayCategory::Scroll, DelayBounds::from_secs(2, 2).unwrap());
        let policy = DelayPolicy::new(&spec);
        assert_eq!(policy.next_delay(DelayCategory::Scroll), Duration::from_secs(2));
    }

    #[test]
    fn inverted_bounds_rejected() {
        assert!(DelayBounds::from_secs(5, 1).is_none());
    }

    #[test]
    fn cancellation_cuts_a_wait_short() {
        let flag = CancellationFlag::new();
        flag.request();
        let started = Instant::now();
        let outcome = sleep_interruptibly(Duration::from_secs(30), &flag);
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn immediate_spec_completes() {
        let policy = DelayPolicy::new(&DelaySpec::immediate());
        assert_eq!(policy.pause(DelayCategory::InterTarget, &NeverCancel), WaitOutcome::Completed);
    }
}
