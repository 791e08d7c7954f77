// per-region percentage and head-count rows

use crate::sv_config::ConservationBounds;
use crate::sv_error::PipelineError;
use crate::sv_interface::{
    partition_compartments, round_count, Compartment, RegionPercentRow, RegionTotalsRow,
    SimTime, StateVector, COMPARTMENT_COUNT,
};

/// Converts single region states into percentage and totals rows.
///
/// Unlike the aggregate check, the per-region conservation sum includes the
/// booster fractions.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    bounds: ConservationBounds,
}

impl Normalizer {
    pub fn new(bounds: ConservationBounds) -> Self {
        Self { bounds }
    }

    /// Sum of S, E, VD1, VD2, I, R, D and every booster fraction
    pub fn conservation_sum(state: &StateVector, booster_count: usize) -> f64 {
        let partition: f64 = partition_compartments().map(|c| state.fraction(c)).sum();
        let boosters: f64 = (0..booster_count)
            .map(|offset| state.booster(offset).unwrap_or(0.0))
            .sum();
        partition + boosters
    }

    pub fn normalize(
        &self,
        time: SimTime,
        region: &str,
        population: f64,
        state: &StateVector,
        booster_count: usize,
    ) -> Result<(RegionPercentRow, RegionTotalsRow), PipelineError> {
        let found = state.probe_booster_count();
        if found != booster_count {
            return Err(PipelineError::BoosterMismatch {
                time,
                region: region.to_string(),
                expected: booster_count,
                found,
            });
        }

        let sum = Self::conservation_sum(state, booster_count);
        if !self.bounds.contains(sum) {
            return Err(PipelineError::Conservation {
                time,
                sum,
                lower: self.bounds.lower,
                upper: self.bounds.upper,
                region: Some(region.to_string()),
            });
        }

        let mut fractions = [0.0f64; COMPARTMENT_COUNT];
        let mut counts = [0i64; COMPARTMENT_COUNT];
        for compartment in Compartment::ALL {
            let fraction = state.fraction(compartment);
            fractions[compartment.column()] = fraction;
            counts[compartment.column()] = round_count(population * fraction) as i64;
        }

        let boosters: Vec<f64> = (0..booster_count)
            .map(|offset| state.booster(offset).unwrap_or(0.0))
            .collect();
        let booster_counts: Vec<i64> = boosters
            .iter()
            .map(|fraction| round_count(population * fraction) as i64)
            .collect();

        Ok((
            RegionPercentRow {
                time,
                fractions,
                boosters,
            },
            RegionTotalsRow {
                time,
                counts,
                boosters: booster_counts,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(fields: &[f64]) -> StateVector {
        StateVector::from_fields(fields.to_vec()).unwrap()
    }

    #[test]
    fn test_totals_match_rounded_percentages() {
        let normalizer = Normalizer::new(ConservationBounds::default());
        let s = state(&[300.0, 0.9, 0.05, 0.0, 0.0, 0.05, 0.0, 0.05, 0.05, 0.0, 0.0]);
        let (percent, totals) = normalizer.normalize(3, "r", 300.0, &s, 0).unwrap();

        assert_eq!(percent.time, 3);
        assert_eq!(totals.time, 3);
        for compartment in Compartment::ALL {
            let i = compartment.column();
            assert_eq!(percent.fractions[i], s.fraction(compartment));
            assert_eq!(totals.counts[i], round_count(300.0 * percent.fractions[i]) as i64);
        }
        assert_eq!(totals.counts[Compartment::Susceptible.column()], 270);
        assert_eq!(totals.counts[Compartment::Exposed.column()], 15);
    }

    #[test]
    fn test_half_counts_round_to_even() {
        let normalizer = Normalizer::new(ConservationBounds::default());
        // 1 * 0.5 = 0.5 -> 0 and 5 * 0.5 = 2.5 -> 2
        let s = state(&[1.0, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0]);
        let (_, totals) = normalizer.normalize(0, "r", 1.0, &s, 0).unwrap();
        assert_eq!(totals.counts[Compartment::Susceptible.column()], 0);
        assert_eq!(totals.counts[Compartment::NewExposed.column()], 0);

        let (_, totals) = normalizer.normalize(0, "r", 5.0, &s, 0).unwrap();
        assert_eq!(totals.counts[Compartment::Susceptible.column()], 2);

        let (_, totals) = normalizer.normalize(0, "r", 3.0, &s, 0).unwrap();
        assert_eq!(totals.counts[Compartment::Susceptible.column()], 2);
    }

    #[test]
    fn test_region_conservation_includes_boosters() {
        let normalizer = Normalizer::new(ConservationBounds::default());
        // partition alone is 0.8; the 0.2 booster brings it to 1.0
        let s = state(&[100.0, 0.5, 0.1, 0.0, 0.0, 0.1, 0.1, 0.0, 0.0, 0.0, 0.0, 0.2]);
        let (percent, totals) = normalizer.normalize(1, "r", 100.0, &s, 1).unwrap();
        assert_eq!(percent.boosters, vec![0.2]);
        assert_eq!(totals.boosters, vec![20]);

        // the same partition without boosters fails
        let s = state(&[100.0, 0.5, 0.1, 0.0, 0.0, 0.1, 0.1, 0.0, 0.0, 0.0, 0.0]);
        let err = normalizer.normalize(6, "north", 100.0, &s, 0).unwrap_err();
        match err {
            PipelineError::Conservation { time, region, .. } => {
                assert_eq!(time, 6);
                assert_eq!(region.as_deref(), Some("north"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_new_fields_are_not_conserved() {
        let normalizer = Normalizer::new(ConservationBounds::default());
        let s = state(&[100.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.4, 0.4, 0.4, 0.0]);
        assert!(normalizer.normalize(0, "r", 100.0, &s, 0).is_ok());
    }

    #[test]
    fn test_booster_tail_must_match_run() {
        let normalizer = Normalizer::new(ConservationBounds::default());
        let s = state(&[100.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let err = normalizer.normalize(4, "r", 100.0, &s, 2).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BoosterMismatch { time: 4, expected: 2, found: 1, .. }
        ));
    }
}
