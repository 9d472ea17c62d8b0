use std::fmt;

use crate::dynamics::state::State;
use crate::physics::gravity::G0;

use super::event::{FlightEvent, FlightEventKind};
use super::warning::WarningSet;

// ---------------------------------------------------------------------------
// Per-sample derived quantities
// ---------------------------------------------------------------------------

/// Quantities derived from the state when a sample is recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightSnapshot {
    pub mass: f64,             // kg
    pub propellant_mass: f64,  // kg
    pub cg: f64,               // m from the nose tip
    pub cp: f64,               // m from the nose tip
    pub stability: f64,        // calibers, (cp - cg) / reference diameter
    pub aoa: f64,              // rad
    pub mach: f64,
    pub airspeed: f64,         // m/s
    pub thrust: f64,           // N
    pub drag: f64,             // N
    pub dynamic_pressure: f64, // Pa
    pub acceleration: f64,     // m/s^2, magnitude
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub state: State,
    pub data: FlightSnapshot,
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// Why a branch stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    GroundHit,
    MaxTime,
    Aborted { listener: String },
    /// A listener or event handler asked for the run to end.
    Requested,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::GroundHit => f.write_str("ground hit"),
            TerminationReason::MaxTime => f.write_str("maximum time reached"),
            TerminationReason::Aborted { listener } => write!(f, "aborted by {listener}"),
            TerminationReason::Requested => f.write_str("termination requested"),
        }
    }
}

/// One continuous stream of samples. Append-only while the run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightDataBranch {
    name: String,
    samples: Vec<Sample>,
    events: Vec<FlightEvent>,
    termination: Option<TerminationReason>,
}

impl FlightDataBranch {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: vec![],
            events: vec![],
            termination: None,
        }
    }

    pub(crate) fn push_sample(&mut self, sample: Sample) {
        debug_assert!(
            self.samples.last().map_or(true, |s| s.state.time <= sample.state.time),
            "branch {} sample time went backwards",
            self.name
        );
        self.samples.push(sample);
    }

    pub(crate) fn push_event(&mut self, event: FlightEvent) {
        self.events.push(event);
    }

    pub(crate) fn set_termination(&mut self, reason: TerminationReason) {
        self.termination = Some(reason);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn events(&self) -> &[FlightEvent] {
        &self.events
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.state.time)
    }

    pub fn event_kinds(&self) -> Vec<FlightEventKind> {
        self.events.iter().map(|e| e.kind).collect()
    }

    pub fn first_event(&self, kind: FlightEventKind) -> Option<&FlightEvent> {
        self.events.iter().find(|e| e.kind == kind)
    }

    pub fn max_altitude(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.state.pos.z)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

// ---------------------------------------------------------------------------
// Whole-run record
// ---------------------------------------------------------------------------

/// Output of one run: the main branch first, then one branch per separated stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightData {
    branches: Vec<FlightDataBranch>,
    warnings: WarningSet,
}

impl FlightData {
    pub(crate) fn new(branches: Vec<FlightDataBranch>, warnings: WarningSet) -> Self {
        Self { branches, warnings }
    }

    pub fn branches(&self) -> &[FlightDataBranch] {
        &self.branches
    }

    pub fn branch(&self, idx: usize) -> Option<&FlightDataBranch> {
        self.branches.get(idx)
    }

    pub fn main_branch(&self) -> Option<&FlightDataBranch> {
        self.branches.first()
    }

    pub fn warnings(&self) -> &WarningSet {
        &self.warnings
    }

    /// Headline numbers of the main branch, `None` if it has no samples.
    pub fn summary(&self) -> Option<FlightSummary> {
        FlightSummary::from_branch(self.main_branch()?)
    }
}

/// Summary statistics of one branch.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightSummary {
    pub apogee: f64,
    pub apogee_time: f64,
    pub max_speed: f64,
    pub max_mach: f64,
    pub max_acceleration: f64,
    pub max_acceleration_g: f64,
    pub flight_time: f64,
    pub impact_speed: f64,
}

impl FlightSummary {
    pub fn from_branch(branch: &FlightDataBranch) -> Option<Self> {
        let samples = branch.samples();
        let last = samples.last()?;
        let apogee = samples
            .iter()
            .max_by(|a, b| a.state.pos.z.total_cmp(&b.state.pos.z))?;
        let max_of = |f: fn(&Sample) -> f64| samples.iter().map(f).fold(0.0_f64, f64::max);
        let max_acceleration = max_of(|s| s.data.acceleration);

        Some(FlightSummary {
            apogee: apogee.state.pos.z,
            apogee_time: apogee.state.time,
            max_speed: max_of(|s| s.state.vel.norm()),
            max_mach: max_of(|s| s.data.mach),
            max_acceleration,
            max_acceleration_g: max_acceleration / G0,
            flight_time: last.state.time,
            impact_speed: last.state.vel.norm(),
        })
    }
}

impl fmt::Display for FlightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "apogee        {:>9.1} m at {:.2} s", self.apogee, self.apogee_time)?;
        writeln!(f, "max speed     {:>9.1} m/s (Mach {:.3})", self.max_speed, self.max_mach)?;
        writeln!(
            f,
            "max accel     {:>9.1} m/s² ({:.1} g)",
            self.max_acceleration, self.max_acceleration_g
        )?;
        writeln!(f, "flight time   {:>9.2} s", self.flight_time)?;
        write!(f, "impact speed  {:>9.1} m/s", self.impact_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    fn sample(time: f64, alt: f64, vz: f64, accel: f64) -> Sample {
        Sample {
            state: State {
                time,
                pos: Vector3::new(0.0, 0.0, alt),
                vel: Vector3::new(0.0, 0.0, vz),
                quat: UnitQuaternion::identity(),
                omega: Vector3::zeros(),
            },
            data: FlightSnapshot { acceleration: accel, mach: vz.abs() / 340.0, ..Default::default() },
        }
    }

    fn simple_branch() -> FlightDataBranch {
        let mut b = FlightDataBranch::new("Main");
        b.push_sample(sample(0.0, 0.0, 0.0, 0.0));
        b.push_sample(sample(1.0, 50.0, 100.0, 80.0));
        b.push_sample(sample(10.0, 500.0, 0.0, 9.8));
        b.push_sample(sample(20.0, 0.0, -30.0, 9.8));
        b.push_event(FlightEvent::new(FlightEventKind::Launch, 0.0, None));
        b.push_event(FlightEvent::new(FlightEventKind::Apogee, 10.0, None));
        b.set_termination(TerminationReason::GroundHit);
        b
    }

    #[test]
    fn summary_values() {
        let data = FlightData::new(vec![simple_branch()], WarningSet::new());
        let s = data.summary().expect("main branch has samples");
        assert_eq!(s.apogee, 500.0);
        assert_eq!(s.apogee_time, 10.0);
        assert_eq!(s.max_speed, 100.0);
        assert_eq!(s.max_acceleration, 80.0);
        assert_eq!(s.flight_time, 20.0);
        assert_eq!(s.impact_speed, 30.0);
        assert!((s.max_acceleration_g - 80.0 / G0).abs() < 1e-12);
    }

    #[test]
    fn empty_data_has_no_summary() {
        assert!(FlightData::default().summary().is_none());
        let data = FlightData::new(vec![FlightDataBranch::new("Main")], WarningSet::new());
        assert!(data.summary().is_none());
    }

    #[test]
    fn branch_accessors() {
        let b = simple_branch();
        assert_eq!(b.event_kinds(), vec![FlightEventKind::Launch, FlightEventKind::Apogee]);
        assert_eq!(b.first_event(FlightEventKind::Apogee).map(|e| e.time), Some(10.0));
        assert_eq!(b.last_time(), Some(20.0));
        assert_eq!(b.max_altitude(), 500.0);
        assert_eq!(b.termination(), Some(&TerminationReason::GroundHit));
    }
}
