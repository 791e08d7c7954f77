// latest state per region, with the population fixed at first sight

use indexmap::IndexMap;

use crate::sv_interface::{RegionId, SimTime, StateVector};

/// In-memory view of every region observed so far.
///
/// Insertion ordered, so iteration (and "the first region") is stable.
#[derive(Debug, Default)]
pub struct RegionStore {
    populations: IndexMap<RegionId, f64>,
    states: IndexMap<RegionId, StateVector>,
}

/// One region as seen through a snapshot
#[derive(Debug, Clone, Copy)]
pub struct RegionView<'a> {
    pub region: &'a str,
    pub population: f64,
    pub state: &'a StateVector,
}

/// Read-only view of the store at a time boundary
#[derive(Debug, Clone, Copy)]
pub struct TimeSnapshot<'a> {
    pub time: SimTime,
    store: &'a RegionStore,
}

impl<'a> TimeSnapshot<'a> {
    pub fn regions(&self) -> impl Iterator<Item = RegionView<'a>> + 'a {
        let store = self.store;
        store.states.iter().map(move |(region, state)| RegionView {
            region: region.as_str(),
            population: store
                .populations
                .get(region)
                .copied()
                .unwrap_or_else(|| state.population()),
            state,
        })
    }

    pub fn first(&self) -> Option<RegionView<'a>> {
        self.regions().next()
    }

    pub fn len(&self) -> usize {
        self.store.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.states.is_empty()
    }
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix a region's population without recording a state (population pass).
    /// Later calls for the same region are ignored.
    pub fn register_population(&mut self, region: &str, population: f64) {
        if !self.populations.contains_key(region) {
            self.populations.insert(region.to_string(), population);
        }
    }

    /// Record the latest state of a region, fixing its population on first sight
    pub fn observe(&mut self, region: &str, state: StateVector) {
        self.register_population(region, state.population());
        match self.states.get_mut(region) {
            Some(existing) => *existing = state,
            None => {
                self.states.insert(region.to_string(), state);
            }
        }
    }

    pub fn snapshot(&self, time: SimTime) -> TimeSnapshot<'_> {
        TimeSnapshot { time, store: self }
    }

    pub fn population(&self, region: &str) -> Option<f64> {
        self.populations.get(region).copied()
    }

    /// Sum of all fixed populations
    pub fn total_population(&self) -> f64 {
        self.populations.values().sum()
    }

    /// Regions with a recorded state
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
