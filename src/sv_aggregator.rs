// reduce a region snapshot into population-wide fractions

use log::debug;

use crate::sv_config::ConservationBounds;
use crate::sv_error::PipelineError;
use crate::sv_interface::{
    partition_compartments, round_count, AggregateRow, Compartment, COMPARTMENT_COUNT,
};
use crate::sv_region_store::TimeSnapshot;

/// Turns one snapshot per simulation time into an `AggregateRow`.
///
/// The booster count is discovered on the first reduction and then held
/// for the rest of the run; every later region must carry the same tail.
#[derive(Debug)]
pub struct Aggregator {
    bounds: ConservationBounds,
    booster_count: Option<usize>,
}

impl Aggregator {
    pub fn new(bounds: ConservationBounds) -> Self {
        Self {
            bounds,
            booster_count: None,
        }
    }

    /// `None` until the first non-empty snapshot has been reduced
    pub fn booster_count(&self) -> Option<usize> {
        self.booster_count
    }

    /// Probe the booster tail on the first region of the snapshot
    pub fn discover_booster_count(&mut self, snapshot: &TimeSnapshot<'_>) -> usize {
        if let Some(count) = self.booster_count {
            return count;
        }
        let count = snapshot
            .first()
            .map(|view| view.state.probe_booster_count())
            .unwrap_or(0);
        debug!("discovered {} booster fields at time {}", count, snapshot.time);
        self.booster_count = Some(count);
        count
    }

    pub fn reduce(
        &mut self,
        snapshot: &TimeSnapshot<'_>,
        total_population: f64,
    ) -> Result<AggregateRow, PipelineError> {
        let time = snapshot.time;
        if total_population <= 0.0 {
            return Err(PipelineError::EmptyPopulation { time });
        }

        let booster_count = self.discover_booster_count(snapshot);
        debug!("reducing {} regions at time {}", snapshot.len(), time);

        let mut counts = [0.0f64; COMPARTMENT_COUNT];
        let mut booster_counts = vec![0.0f64; booster_count];

        for view in snapshot.regions() {
            let found = view.state.probe_booster_count();
            if found != booster_count {
                return Err(PipelineError::BoosterMismatch {
                    time,
                    region: view.region.to_string(),
                    expected: booster_count,
                    found,
                });
            }

            // weight by the region's own population, rounded to whole people
            for compartment in Compartment::ALL {
                counts[compartment.column()] +=
                    round_count(view.population * view.state.fraction(compartment));
            }
            for (offset, total) in booster_counts.iter_mut().enumerate() {
                let fraction = view.state.booster(offset).unwrap_or(0.0);
                *total += round_count(view.population * fraction);
            }
        }

        let mut fractions = [0.0f64; COMPARTMENT_COUNT];
        for (fraction, count) in fractions.iter_mut().zip(counts.iter()) {
            *fraction = count / total_population;
        }
        let boosters: Vec<f64> = booster_counts
            .iter()
            .map(|count| count / total_population)
            .collect();

        // boosters and new_* are not part of this sum
        let conservation_sum: f64 = partition_compartments()
            .map(|c| fractions[c.column()])
            .sum();

        if !self.bounds.contains(conservation_sum) {
            return Err(PipelineError::Conservation {
                time,
                sum: conservation_sum,
                lower: self.bounds.lower,
                upper: self.bounds.upper,
                region: None,
            });
        }

        Ok(AggregateRow {
            time,
            fractions,
            boosters,
            conservation_sum,
        })
    }
}
