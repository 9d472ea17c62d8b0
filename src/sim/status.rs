use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::dynamics::state::State;
use crate::error::SimulationError;
use crate::math::pow2;
use crate::vehicle::{MotorMount, Rocket, Stage};

use super::conditions::Conditions;
use super::event::{EventQueue, EventSource, FlightEvent, FlightEventKind, TIME_TOLERANCE};
use super::flight_data::{FlightDataBranch, TerminationReason};
use super::warning::{Warning, WarningSet};

// ---------------------------------------------------------------------------
// Flight configuration: which stages are still attached, what burns, what is deployed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceRef {
    pub stage: usize,
    pub index: usize,
}

/// Rocket snapshot plus the mutable configuration of one flight branch.
///
/// Stage offsets are measured from the nose tip of the attached stack,
/// so the highest attached stage sits at offset zero.
#[derive(Debug, Clone)]
pub struct FlightConfiguration {
    rocket: Arc<Rocket>,
    motor_configuration: String,
    mounts: BTreeMap<usize, MotorMount>,
    active: BTreeSet<usize>,
    ignitions: BTreeMap<usize, f64>,
    deployed: BTreeSet<DeviceRef>,
}

impl FlightConfiguration {
    pub fn new(rocket: Arc<Rocket>, motor_configuration: &str) -> Result<Self, SimulationError> {
        let mounts = rocket
            .motor_configuration(motor_configuration)
            .ok_or_else(|| SimulationError::MissingMotorConfiguration(motor_configuration.to_string()))?
            .mounts
            .clone();
        let active = (0..rocket.stage_count()).collect();
        Ok(Self {
            rocket,
            motor_configuration: motor_configuration.to_string(),
            mounts,
            active,
            ignitions: BTreeMap::new(),
            deployed: BTreeSet::new(),
        })
    }

    pub fn rocket(&self) -> &Rocket {
        &self.rocket
    }

    pub fn motor_configuration_id(&self) -> &str {
        &self.motor_configuration
    }

    /// Attached stages, bottom first.
    pub fn active_stages(&self) -> impl DoubleEndedIterator<Item = (usize, &Stage)> + '_ {
        self.active
            .iter()
            .filter_map(move |&i| self.rocket.stage(i).map(|s| (i, s)))
    }

    pub fn is_active(&self, stage: usize) -> bool {
        self.active.contains(&stage)
    }

    /// Lowest attached stage, the next one to burn and separate.
    pub fn bottom_stage(&self) -> Option<usize> {
        self.active.iter().next().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Distance from the nose tip to the fore end of `stage`.
    pub fn stage_offset(&self, stage: usize) -> f64 {
        self.active_stages()
            .filter(|&(i, _)| i > stage)
            .map(|(_, s)| s.length())
            .sum()
    }

    pub fn total_length(&self) -> f64 {
        self.active_stages().map(|(_, s)| s.length()).sum()
    }

    pub fn reference_length(&self) -> f64 {
        self.active_stages()
            .map(|(_, s)| s.max_diameter())
            .fold(0.0, f64::max)
    }

    pub fn reference_area(&self) -> f64 {
        PI * pow2(self.reference_length() / 2.0)
    }

    pub fn mount(&self, stage: usize) -> Option<&MotorMount> {
        self.mounts.get(&stage)
    }

    pub fn ignition_time(&self, stage: usize) -> Option<f64> {
        self.ignitions.get(&stage).copied()
    }

    pub fn ignite(&mut self, stage: usize, time: f64) {
        self.ignitions.entry(stage).or_insert(time);
    }

    /// Time since ignition of the motor in `stage`, if it has been lit.
    pub fn burn_elapsed(&self, stage: usize, time: f64) -> Option<f64> {
        self.ignition_time(stage).map(|t0| time - t0)
    }

    /// Total thrust of the attached, ignited motors.
    pub fn thrust(&self, time: f64) -> f64 {
        self.active
            .iter()
            .filter_map(|&i| Some(self.mount(i)?.motor.thrust_at(self.burn_elapsed(i, time)?)))
            .sum()
    }

    pub fn is_burning(&self, time: f64) -> bool {
        self.active.iter().any(|&i| match (self.mount(i), self.burn_elapsed(i, time)) {
            (Some(m), Some(dt)) => dt >= 0.0 && dt < m.motor.burn_time() - TIME_TOLERANCE,
            _ => false,
        })
    }

    pub fn deploy(&mut self, device: DeviceRef) -> bool {
        self.deployed.insert(device)
    }

    pub fn is_deployed(&self, device: DeviceRef) -> bool {
        self.deployed.contains(&device)
    }

    pub fn has_recovery(&self) -> bool {
        self.active_stages().any(|(_, s)| s.has_recovery())
    }

    /// Sum of Cd·A over deployed devices on attached stages, m².
    pub fn recovery_drag_area(&self) -> f64 {
        self.deployed
            .iter()
            .filter(|d| self.is_active(d.stage))
            .filter_map(|d| self.rocket.stage(d.stage)?.recovery.get(d.index))
            .map(|r| r.drag_area())
            .sum()
    }

    /// Detach `stage` and return the configuration the detached part flies on with.
    pub fn separate(&mut self, stage: usize) -> FlightConfiguration {
        self.active.remove(&stage);
        let mut detached = self.clone();
        detached.active = BTreeSet::from([stage]);
        detached
    }
}

// ---------------------------------------------------------------------------
// Per-branch run status, the view listeners get of a run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Running,
    Terminated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightFlags {
    pub launched: bool,
    pub liftoff: bool,
    pub rod_cleared: bool,
    pub apogee_reached: bool,
}

impl FlightFlags {
    /// Whether the one-shot event `kind` has already happened on this branch.
    pub fn is_set(&self, kind: FlightEventKind) -> bool {
        match kind {
            FlightEventKind::Launch => self.launched,
            FlightEventKind::Liftoff => self.liftoff,
            FlightEventKind::LaunchRodCleared => self.rod_cleared,
            FlightEventKind::Apogee => self.apogee_reached,
            _ => false,
        }
    }
}

/// Everything one branch of a run owns while it is in progress.
#[derive(Debug)]
pub struct SimulationStatus {
    pub(crate) state: State,
    pub(crate) configuration: FlightConfiguration,
    pub(crate) conditions: Arc<Conditions>,
    pub(crate) flags: FlightFlags,
    pub(crate) queue: EventQueue,
    pub(crate) warnings: WarningSet,
    pub(crate) branch: FlightDataBranch,
    pub(crate) phase: RunPhase,
    pub(crate) termination: Option<TerminationReason>,
    pub(crate) last_error_estimate: f64,
}

impl SimulationStatus {
    pub(crate) fn new(
        state: State,
        configuration: FlightConfiguration,
        conditions: Arc<Conditions>,
        branch_name: impl Into<String>,
    ) -> Self {
        Self {
            state,
            configuration,
            conditions,
            flags: FlightFlags::default(),
            queue: EventQueue::new(),
            warnings: WarningSet::new(),
            branch: FlightDataBranch::new(branch_name),
            phase: RunPhase::NotStarted,
            termination: None,
            last_error_estimate: 0.0,
        }
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Listeners editing the state should return `HookResult::Modified`.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn configuration(&self) -> &FlightConfiguration {
        &self.configuration
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn flags(&self) -> &FlightFlags {
        &self.flags
    }

    pub fn warnings(&self) -> &WarningSet {
        &self.warnings
    }

    pub fn add_warning(&mut self, warning: Warning) -> bool {
        self.warnings.add(warning)
    }

    pub fn branch(&self) -> &FlightDataBranch {
        &self.branch
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    pub fn last_error_estimate(&self) -> f64 {
        self.last_error_estimate
    }

    /// Queue an event. Events dated in the past are dispatched at the next check,
    /// stamped with the time they are dispatched at.
    pub fn add_event(&mut self, kind: FlightEventKind, time: f64, source: Option<EventSource>) {
        self.queue.push(FlightEvent::new(kind, time, source));
    }

    pub fn pending_events(&self) -> &EventQueue {
        &self.queue
    }

    /// Cooperative termination; the run stops before the next step.
    pub fn request_termination(&mut self) {
        self.terminate(TerminationReason::Requested);
    }

    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.termination.is_some()
    }
}
