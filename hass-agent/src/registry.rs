//! Dynamic resource registry
//!
//! Tracks the rate counters of resources that come and go at runtime (disks,
//! network adapters). Each cycle the registry is reconciled against the
//! freshly enumerated set:
//! - new names get a counter primed with their first reading (never reported)
//! - vanished names are dropped
//! - the rest produce a real rate from the delta since the previous reading
//!
//! Totals are a fold over the current cycle's rates, never a running sum.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::debug;

/// A per-resource counter that needs a baseline before it can report.
pub trait RateCounter {
    /// Raw cumulative reading taken from the metrics provider.
    type Reading;
    /// Value reported once a baseline exists.
    type Rate;

    /// Create the counter from its priming reading.
    fn prime(reading: Self::Reading, at: Instant) -> Self;

    /// Consume a new reading and return the rate since the previous one.
    fn sample(&mut self, reading: Self::Reading, at: Instant) -> Self::Rate;
}

/// Values that can be summed field by field.
pub trait Aggregate {
    /// Neutral element of [`Aggregate::combine`].
    fn zero() -> Self;

    fn combine(&self, other: &Self) -> Self;
}

/// Fold `items` into one value starting from [`Aggregate::zero`].
pub fn aggregate<'a, T>(items: impl IntoIterator<Item = &'a T>) -> T
where
    T: Aggregate + 'a,
{
    items.into_iter().fold(T::zero(), |acc, item| acc.combine(item))
}

/// A value attached to a resource name. The category total has an empty name.
#[derive(Debug, Clone, PartialEq)]
pub struct Named<T> {
    pub name: String,
    pub value: T,
}

impl<T> Named<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl<T: Aggregate> Named<T> {
    /// Per-resource entries followed by their empty-named total.
    pub fn with_total(mut entries: Vec<Named<T>>) -> Vec<Named<T>> {
        let total = aggregate(entries.iter().map(|entry| &entry.value));
        entries.push(Named::new("", total));
        entries
    }
}

/// Outcome of one reconciliation.
#[derive(Debug)]
pub struct Reconciled<R> {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Rates of resources tracked before this cycle, ordered by name.
    pub rates: Vec<Named<R>>,
}

/// Live counters of one resource category, keyed by resource name.
pub struct ResourceRegistry<C> {
    category: &'static str,
    entries: BTreeMap<String, C>,
}

impl<C: RateCounter> ResourceRegistry<C> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            entries: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Bring the tracked set in line with `readings` and sample survivors.
    pub fn reconcile(
        &mut self,
        mut readings: BTreeMap<String, C::Reading>,
        at: Instant,
    ) -> Reconciled<C::Rate> {
        let removed: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !readings.contains_key(*name))
            .cloned()
            .collect();
        for name in &removed {
            debug!("Remove {}: {}", self.category, name);
            self.entries.remove(name);
        }

        let mut added = Vec::new();
        let mut rates = Vec::with_capacity(self.entries.len());

        // `readings` is a BTreeMap, so rates come out ordered by name
        while let Some((name, reading)) = readings.pop_first() {
            match self.entries.get_mut(&name) {
                Some(counter) => rates.push(Named::new(name, counter.sample(reading, at))),
                None => {
                    debug!("Add {}: {}", self.category, name);
                    self.entries.insert(name.clone(), C::prime(reading, at));
                    added.push(name);
                }
            }
        }

        Reconciled {
            added,
            removed,
            rates,
        }
    }
}
