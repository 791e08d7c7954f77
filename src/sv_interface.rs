// shared types for the state log and the timeseries derived from it

use std::fmt;

pub type SimTime = u64;
pub type RegionId = String;

// ============================================================================
// State log field layout
// ============================================================================
//
// A region line in the simulator log carries a bracketed payload:
//
//   State for model _8 is <1.39902e+09,0.999999,5.99972e-07,0,0,0,0,5.99972e-07,0,0,0>
//
// Field 0 is the region population, fields 1..=10 are population fractions
// (see `Compartment`) and any further fields are booster-dose fractions. The
// number of booster fields is not declared anywhere in the log; it is probed
// from the data (see `StateVector::booster`).

pub const POPULATION_INDEX: usize = 0;
pub const S_INDEX: usize = 1;
pub const E_INDEX: usize = 2;
pub const VD1_INDEX: usize = 3;
pub const VD2_INDEX: usize = 4;
pub const I_INDEX: usize = 5;
pub const R_INDEX: usize = 6;
pub const NEW_E_INDEX: usize = 7;
pub const NEW_I_INDEX: usize = 8;
pub const NEW_R_INDEX: usize = 9;
pub const D_INDEX: usize = 10;

/// Population plus the ten compartment fields
pub const BASE_FIELD_COUNT: usize = 11;

/// Number of compartment columns (fields 1..=10)
pub const COMPARTMENT_COUNT: usize = 10;

/// One of the ten fixed fraction fields of a state vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compartment {
    Susceptible,
    Exposed,
    VaccinatedDose1,
    VaccinatedDose2,
    Infected,
    Recovered,
    NewExposed,
    NewInfected,
    NewRecovered,
    Dead,
}

impl Compartment {
    /// All compartments in log field order
    pub const ALL: [Compartment; COMPARTMENT_COUNT] = [
        Compartment::Susceptible,
        Compartment::Exposed,
        Compartment::VaccinatedDose1,
        Compartment::VaccinatedDose2,
        Compartment::Infected,
        Compartment::Recovered,
        Compartment::NewExposed,
        Compartment::NewInfected,
        Compartment::NewRecovered,
        Compartment::Dead,
    ];

    /// Index of this compartment inside a state vector
    pub fn field_index(self) -> usize {
        match self {
            Compartment::Susceptible => S_INDEX,
            Compartment::Exposed => E_INDEX,
            Compartment::VaccinatedDose1 => VD1_INDEX,
            Compartment::VaccinatedDose2 => VD2_INDEX,
            Compartment::Infected => I_INDEX,
            Compartment::Recovered => R_INDEX,
            Compartment::NewExposed => NEW_E_INDEX,
            Compartment::NewInfected => NEW_I_INDEX,
            Compartment::NewRecovered => NEW_R_INDEX,
            Compartment::Dead => D_INDEX,
        }
    }

    /// Position of this compartment in `ALL` and in row value arrays
    pub fn column(self) -> usize {
        self.field_index() - 1
    }

    /// `new_*` fields count transitions during one step; they are not part
    /// of the population partition.
    pub fn is_incremental(self) -> bool {
        matches!(
            self,
            Compartment::NewExposed | Compartment::NewInfected | Compartment::NewRecovered
        )
    }

    /// Column label used in emitted timeseries files
    pub fn header(self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Exposed => "E",
            Compartment::VaccinatedDose1 => "VD1",
            Compartment::VaccinatedDose2 => "VD2",
            Compartment::Infected => "I",
            Compartment::Recovered => "R",
            Compartment::NewExposed => "New_E",
            Compartment::NewInfected => "New_I",
            Compartment::NewRecovered => "New_R",
            Compartment::Dead => "D",
        }
    }

    /// Column label used in the plotting frame
    pub fn frame_label(self) -> &'static str {
        match self {
            Compartment::Susceptible => "susceptible",
            Compartment::Exposed => "exposed",
            Compartment::VaccinatedDose1 => "vaccinatedD1",
            Compartment::VaccinatedDose2 => "vaccinatedD2",
            Compartment::Infected => "infected",
            Compartment::Recovered => "recovered",
            Compartment::NewExposed => "new_exposed",
            Compartment::NewInfected => "new_infected",
            Compartment::NewRecovered => "new_recovered",
            Compartment::Dead => "deaths",
        }
    }
}

/// Compartments that partition the population (conservation check)
pub fn partition_compartments() -> impl Iterator<Item = Compartment> {
    Compartment::ALL.into_iter().filter(|c| !c.is_incremental())
}

/// Round half to even. Used for every fraction -> head-count conversion.
pub fn round_count(value: f64) -> f64 {
    value.round_ties_even()
}

// ============================================================================
// State vector
// ============================================================================

/// Raw fields of one region line: population, ten fractions and a booster tail
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    fields: Vec<f64>,
}

impl StateVector {
    /// Returns `None` when the payload is too short to hold the fixed prefix
    pub fn from_fields(fields: Vec<f64>) -> Option<Self> {
        if fields.len() < BASE_FIELD_COUNT {
            return None;
        }
        Some(Self { fields })
    }

    pub fn population(&self) -> f64 {
        self.fields[POPULATION_INDEX]
    }

    pub fn fraction(&self, compartment: Compartment) -> f64 {
        self.fields[compartment.field_index()]
    }

    /// Raw field access; `None` past the end of the vector
    pub fn field(&self, index: usize) -> Option<f64> {
        self.fields.get(index).copied()
    }

    /// Booster fraction at `offset` past field 10. `None` marks the
    /// structural end of the tail, it is not an error.
    pub fn booster(&self, offset: usize) -> Option<f64> {
        self.field(BASE_FIELD_COUNT + offset)
    }

    /// Length of the booster tail, found by probing offsets until one is missing
    pub fn probe_booster_count(&self) -> usize {
        let mut offset = 0;
        while self.booster(offset).is_some() {
            offset += 1;
        }
        offset
    }

    pub fn fields(&self) -> &[f64] {
        &self.fields
    }
}

// ============================================================================
// Log events
// ============================================================================

/// One meaningful line of the state log
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// All following region lines belong to this simulation time
    TimeMarker(SimTime),

    /// State of one region at the current time
    RegionObservation { region: RegionId, state: StateVector },
}

// ============================================================================
// Rows
// ============================================================================

/// A single emitted value; counts stay integral in the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FieldValue::Int(v) => v as f64,
            FieldValue::Float(v) => v,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Anything that can be written as one line of a timeseries file
pub trait TimeseriesRow {
    fn sim_time(&self) -> SimTime;

    /// Values after the time column, in header order
    fn values(&self) -> Vec<FieldValue>;
}

/// Population-wide fractions for one simulation time
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub time: SimTime,
    pub fractions: [f64; COMPARTMENT_COUNT],
    pub boosters: Vec<f64>,
    pub conservation_sum: f64,
}

impl AggregateRow {
    pub fn fraction(&self, compartment: Compartment) -> f64 {
        self.fractions[compartment.column()]
    }
}

impl TimeseriesRow for AggregateRow {
    fn sim_time(&self) -> SimTime {
        self.time
    }

    fn values(&self) -> Vec<FieldValue> {
        self.fractions
            .iter()
            .chain(self.boosters.iter())
            .chain(std::iter::once(&self.conservation_sum))
            .map(|v| FieldValue::Float(*v))
            .collect()
    }
}

/// Fractions of one region at one time, copied verbatim from the log
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPercentRow {
    pub time: SimTime,
    pub fractions: [f64; COMPARTMENT_COUNT],
    pub boosters: Vec<f64>,
}

impl TimeseriesRow for RegionPercentRow {
    fn sim_time(&self) -> SimTime {
        self.time
    }

    fn values(&self) -> Vec<FieldValue> {
        self.fractions
            .iter()
            .chain(self.boosters.iter())
            .map(|v| FieldValue::Float(*v))
            .collect()
    }
}

/// Head counts of one region at one time
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTotalsRow {
    pub time: SimTime,
    pub counts: [i64; COMPARTMENT_COUNT],
    pub boosters: Vec<i64>,
}

impl TimeseriesRow for RegionTotalsRow {
    fn sim_time(&self) -> SimTime {
        self.time
    }

    fn values(&self) -> Vec<FieldValue> {
        self.counts
            .iter()
            .chain(self.boosters.iter())
            .map(|v| FieldValue::Int(*v))
            .collect()
    }
}
