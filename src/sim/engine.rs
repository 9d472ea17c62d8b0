use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, info_span, trace, warn, Dispatch};

use crate::aero::{AeroConditions, AerodynamicCalculator};
use crate::dynamics::derivatives::DerivativeContext;
use crate::dynamics::state::State;
use crate::error::{ListenerError, ModelError, SimulationError};
use crate::mass::MassCalculator;
use crate::math::EPSILON;
use crate::physics::atmosphere;
use crate::physics::wind::WindModel;
use crate::vehicle::{DeployTrigger, Rocket, SeparationEvent};

use super::conditions::Conditions;
use super::event::{self, EventSource, FlightEvent, FlightEventKind, TIME_TOLERANCE};
use super::flight_data::{FlightData, FlightDataBranch, Sample, TerminationReason};
use super::integrator::Stepper;
use super::listener::{ChainOutcome, HookFailure, ListenerChain, SimulationListener};
use super::registry::{Registry, StrategySelection};
use super::status::{DeviceRef, FlightConfiguration, RunPhase, SimulationStatus};
use super::warning::{Warning, WarningKind, WarningSet};

/// Deployments above this airspeed are flagged as late, m/s.
const MAX_DEPLOYMENT_SPEED: f64 = 20.0;

/// Mach number used for the launch stability check.
const STABILITY_CHECK_MACH: f64 = 0.3;

// ---------------------------------------------------------------------------
// Run input
// ---------------------------------------------------------------------------

/// Everything one run reads. Snapshots: the engine never sees later edits.
#[derive(Debug, Clone)]
pub struct SimulationSetup {
    pub rocket: Arc<Rocket>,
    pub conditions: Conditions,
    pub strategies: StrategySelection,
    /// Registry ids of the listeners to instantiate, in order.
    pub listeners: Vec<String>,
}

impl SimulationSetup {
    pub fn new(rocket: Arc<Rocket>, conditions: Conditions) -> Self {
        Self {
            rocket,
            conditions,
            strategies: StrategySelection::default(),
            listeners: vec![],
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Event-driven flight simulation engine.
///
/// Holds no per-run state, so one engine can serve independent runs from
/// several threads.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    registry: Arc<Registry>,
    dispatch: Option<Dispatch>,
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(Arc::new(Registry::with_defaults()))
    }
}

impl SimulationEngine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry, dispatch: None }
    }

    /// Route this engine's log output to `dispatch` for the duration of each run.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one simulation. `extra` listeners run before the named ones.
    pub fn simulate(
        &self,
        setup: &SimulationSetup,
        extra: Vec<Box<dyn SimulationListener>>,
    ) -> Result<FlightData, SimulationError> {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, || self.run(setup, extra)),
            None => self.run(setup, extra),
        }
    }

    fn run(
        &self,
        setup: &SimulationSetup,
        extra: Vec<Box<dyn SimulationListener>>,
    ) -> Result<FlightData, SimulationError> {
        // --- Preconditions: nothing runs unless all of these hold ---
        let rocket = Arc::clone(&setup.rocket);
        let config_id = setup
            .conditions
            .motor_configuration
            .clone()
            .ok_or(SimulationError::NoMotorConfiguration)?;
        if rocket.motor_configuration(&config_id).is_none() {
            return Err(SimulationError::MissingMotorConfiguration(config_id));
        }
        setup.conditions.validate()?;
        rocket.validate(&config_id).map_err(SimulationError::InvalidRocket)?;

        let stepper = self.registry.stepper(&setup.strategies.stepper)?;
        let aerodynamics = self.registry.aerodynamics(&setup.strategies.aerodynamics)?;
        let mass = self.registry.mass(&setup.strategies.mass)?;
        let mut listeners = extra;
        listeners.extend(self.registry.listeners(&setup.listeners)?);

        let span = info_span!(
            "simulate",
            rocket = rocket.name(),
            configuration = %config_id,
            stepper = stepper.name(),
        );
        let _enter = span.enter();

        let conditions = Arc::new(setup.conditions.clone());
        let configuration = FlightConfiguration::new(Arc::clone(&rocket), &config_id)?;
        let mut run = Run {
            conditions: Arc::clone(&conditions),
            stepper,
            aerodynamics,
            mass,
            wind: conditions.wind_model(),
            listeners: ListenerChain::new(listeners),
            finished: vec![],
            pending: VecDeque::new(),
        };

        let initial = run.initial_status(configuration);
        let result = run.execute(initial);
        match &result {
            Ok(data) => {
                info!(branches = data.branches().len(), warnings = data.warnings().len(), "simulation finished");
                run.listeners.end_simulation(Ok(data));
            }
            Err(err) => {
                warn!(error = %err, "simulation failed");
                run.listeners.end_simulation(Err(err));
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// One run in progress
// ---------------------------------------------------------------------------

/// Why a branch stopped early with an error.
enum BranchFailure {
    Model(ModelError),
    Listener(HookFailure),
}

impl From<HookFailure> for BranchFailure {
    fn from(f: HookFailure) -> Self {
        BranchFailure::Listener(f)
    }
}

impl From<ModelError> for BranchFailure {
    fn from(e: ModelError) -> Self {
        BranchFailure::Model(e)
    }
}

struct Run {
    conditions: Arc<Conditions>,
    stepper: Box<dyn Stepper>,
    aerodynamics: Box<dyn AerodynamicCalculator>,
    mass: Box<dyn MassCalculator>,
    wind: Box<dyn WindModel>,
    listeners: ListenerChain,
    finished: Vec<FlightDataBranch>,
    pending: VecDeque<SimulationStatus>,
}

impl Run {
    fn initial_status(&self, configuration: FlightConfiguration) -> SimulationStatus {
        let name = configuration.rocket().name().to_string();
        let state = State::at_rest(self.conditions.launch_orientation());
        let bottom = configuration.bottom_stage();
        let ignition = bottom.and_then(|b| configuration.mount(b).map(|m| (b, m.ignition_delay)));

        let mut status = SimulationStatus::new(state, configuration, Arc::clone(&self.conditions), name);
        status.add_event(FlightEventKind::Launch, 0.0, None);
        match ignition {
            Some((stage, delay)) => {
                status.add_event(FlightEventKind::Ignition, delay, Some(EventSource::Stage(stage)))
            }
            None => {
                status.add_warning(Warning::new(WarningKind::NoMotor, ""));
            }
        }
        status
    }

    fn execute(&mut self, mut initial: SimulationStatus) -> Result<FlightData, SimulationError> {
        if let Err(failure) = self.listeners.start_simulation(&mut initial) {
            return Err(self.fail(initial, BranchFailure::Listener(failure)));
        }
        let mut warnings = WarningSet::new();
        self.pending.push_back(initial);

        while let Some(mut status) = self.pending.pop_front() {
            if let Err(failure) = self.run_branch(&mut status) {
                return Err(self.fail(status, failure));
            }
            warnings.absorb(std::mem::take(&mut status.warnings));
            let aborted = match &status.termination {
                Some(TerminationReason::Aborted { listener }) => Some(listener.clone()),
                _ => None,
            };
            self.finished.push(status.branch);

            if let Some(listener) = aborted {
                while let Some(mut branch) = self.pending.pop_front() {
                    if let Err(failure) = self.abort_pending(&mut branch, listener.clone()) {
                        return Err(self.fail(branch, failure));
                    }
                    warnings.absorb(std::mem::take(&mut branch.warnings));
                    self.finished.push(branch.branch);
                }
            }
        }

        Ok(FlightData::new(std::mem::take(&mut self.finished), warnings))
    }

    /// Close a separated branch that never started because the run was aborted.
    fn abort_pending(&mut self, status: &mut SimulationStatus, listener: String) -> Result<(), BranchFailure> {
        debug!(branch = status.branch.name(), time = status.state.time, "branch skipped after abort");
        self.record_sample(status)?;
        self.abort(status, listener);
        self.close_branch(status);
        Ok(())
    }

    /// Close the failing branch with an exception marker and wrap everything recorded so far.
    fn fail(&mut self, mut status: SimulationStatus, failure: BranchFailure) -> SimulationError {
        let time = status.state.time;
        status
            .branch
            .push_event(FlightEvent::new(FlightEventKind::Exception, time, None));
        let mut warnings = WarningSet::new();
        for branch in &self.pending {
            warnings.absorb(branch.warnings.clone());
        }
        warnings.absorb(status.warnings);
        let mut branches = std::mem::take(&mut self.finished);
        branches.push(status.branch);
        let partial = Box::new(FlightData::new(branches, warnings));
        match failure {
            BranchFailure::Model(source) => SimulationError::Model { time, source, partial },
            BranchFailure::Listener(HookFailure { listener, error }) => {
                SimulationError::Listener { listener, time, source: error, partial }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Branch loop
    // -----------------------------------------------------------------------

    fn run_branch(&mut self, status: &mut SimulationStatus) -> Result<(), BranchFailure> {
        status.phase = RunPhase::Running;
        info!(branch = status.branch.name(), time = status.state.time, "branch started");

        self.process_events(status)?;
        self.record_sample(status)?;

        while !status.is_terminating() {
            let previous = status.state.clone();

            match self.listeners.pre_step(status)? {
                ChainOutcome::Abort { listener } => {
                    self.abort(status, listener);
                    break;
                }
                ChainOutcome::SkipStep => {
                    if status.state.time <= previous.time {
                        return Err(BranchFailure::Listener(HookFailure {
                            listener: self.listeners.names().join(", "),
                            error: ListenerError::new("step skipped without advancing time"),
                        }));
                    }
                }
                ChainOutcome::Continue | ChainOutcome::Modified => self.integrate(status)?,
            }
            if status.is_terminating() {
                break;
            }

            match self.listeners.post_step(status)? {
                ChainOutcome::Abort { listener } => {
                    self.abort(status, listener);
                    break;
                }
                ChainOutcome::Modified => check_finite(&status.state)?,
                _ => {}
            }

            self.detect_events(&previous, status);
            if status.state.time >= self.conditions.max_time - TIME_TOLERANCE {
                status.terminate(TerminationReason::MaxTime);
            }
            self.process_events(status)?;
            self.record_sample(status)?;
        }

        self.close_branch(status);
        Ok(())
    }

    /// Advance by one step, shortened to land exactly on the next event or the time limit.
    fn integrate(&mut self, status: &mut SimulationStatus) -> Result<(), BranchFailure> {
        let now = status.state.time;
        let mut dt = self.conditions.time_step;
        let mut target = None;
        let limit = status
            .queue
            .next_time()
            .map_or(self.conditions.max_time, |t| t.min(self.conditions.max_time));
        if limit > now + TIME_TOLERANCE && limit < now + dt + TIME_TOLERANCE {
            dt = limit - now;
            target = Some(limit);
        }

        let ctx = DerivativeContext::new(
            &status.configuration,
            &self.conditions,
            self.aerodynamics.as_ref(),
            self.mass.as_ref(),
            self.wind.as_ref(),
            !status.flags.rod_cleared,
        );
        let outcome = self.stepper.step(&status.state, &|s: &State| ctx.evaluate(s), dt)?;
        let new_warnings = ctx.take_warnings();
        drop(ctx);

        let mut state = outcome.state;
        if let Some(t) = target {
            state.time = t;
        }
        check_finite(&state)?;
        trace!(time = state.time, altitude = state.pos.z, speed = state.vel.norm(), "step");
        status.state = state;
        status.last_error_estimate = outcome.error_estimate;
        self.absorb_warnings(status, new_warnings)
    }

    /// Compare the new state with the previous one and queue what happened in between.
    fn detect_events(&self, previous: &State, status: &mut SimulationStatus) {
        let now = status.state.time;
        let rod = self.conditions.rod_direction();
        let travel = status.state.pos.dot(&rod);

        let lifted = status.flags.liftoff || travel > EPSILON;
        if !status.flags.liftoff && lifted {
            status.add_event(FlightEventKind::Liftoff, now, None);
        }
        if lifted && !status.flags.rod_cleared && travel >= self.conditions.launch_rod_length {
            status.add_event(FlightEventKind::LaunchRodCleared, now, None);
        }
        if !status.flags.liftoff {
            return;
        }
        if !status.flags.apogee_reached && event::apogee_crossed(previous, &status.state) {
            status.add_event(FlightEventKind::Apogee, now, None);
        }
        if status.flags.apogee_reached {
            let mut triggered = vec![];
            for (stage_idx, stage) in status.configuration.active_stages() {
                for (index, device) in stage.recovery.iter().enumerate() {
                    let DeployTrigger::Altitude(h) = device.trigger else { continue };
                    let source = EventSource::RecoveryDevice { stage: stage_idx, index };
                    if event::descended_through(previous, &status.state, h)
                        && !status.configuration.is_deployed(DeviceRef { stage: stage_idx, index })
                        && !status.queue.contains(FlightEventKind::RecoveryDeviceDeployment, Some(&source))
                    {
                        triggered.push((now + device.delay, source));
                    }
                }
            }
            for (time, source) in triggered {
                status.add_event(FlightEventKind::RecoveryDeviceDeployment, time, Some(source));
            }
        }
        if event::ground_reached(&status.state) {
            status.add_event(FlightEventKind::GroundHit, now, None);
        }
    }

    fn process_events(&mut self, status: &mut SimulationStatus) -> Result<(), BranchFailure> {
        while !status.is_terminating() {
            let now = status.state.time;
            let Some(mut event) = status.queue.pop_due(now) else { break };
            if event.time < now - TIME_TOLERANCE {
                trace!(kind = %event.kind, queued = event.time, time = now, "late event");
                event.time = now;
            }
            if !self.handle_event(status, &event)? {
                trace!(kind = %event.kind, time = event.time, "event dropped");
                continue;
            }
            debug!(branch = status.branch.name(), kind = %event.kind, time = event.time, "event");
            status.branch.push_event(event.clone());
            if let ChainOutcome::Abort { listener } = self.listeners.handle_event(status, &event)? {
                self.abort(status, listener);
            }
        }
        Ok(())
    }

    /// Apply an event to the status. Returns `false` for events that no longer apply.
    fn handle_event(&mut self, status: &mut SimulationStatus, event: &FlightEvent) -> Result<bool, BranchFailure> {
        let now = status.state.time;
        let stage = event.source_stage();
        match event.kind {
            FlightEventKind::Launch
            | FlightEventKind::Liftoff
            | FlightEventKind::LaunchRodCleared
            | FlightEventKind::Apogee
                if status.flags.is_set(event.kind) =>
            {
                return Ok(false);
            }
            FlightEventKind::Launch => {
                status.flags.launched = true;
                self.launch_checks(status)?;
                self.schedule_deployments(status, now, |t| matches!(t, DeployTrigger::Launch), None);
                self.schedule_separations(status, now, SeparationEvent::Launch, None);
            }
            FlightEventKind::Ignition => {
                let Some(idx) = stage.filter(|&i| status.configuration.is_active(i)) else {
                    return Ok(false);
                };
                let Some(burn_time) = status.configuration.mount(idx).map(|m| m.motor.burn_time()) else {
                    return Ok(false);
                };
                status.configuration.ignite(idx, now);
                status.add_event(FlightEventKind::Burnout, now + burn_time, Some(EventSource::Stage(idx)));
            }
            FlightEventKind::Liftoff => status.flags.liftoff = true,
            FlightEventKind::LaunchRodCleared => status.flags.rod_cleared = true,
            FlightEventKind::Burnout => {
                let Some(idx) = stage.filter(|&i| status.configuration.is_active(i)) else {
                    return Ok(false);
                };
                let delay = status.configuration.mount(idx).and_then(|m| m.motor.ejection_delay);
                if let Some(delay) = delay {
                    status.add_event(FlightEventKind::EjectionCharge, now + delay, Some(EventSource::Stage(idx)));
                }
                self.schedule_separations(status, now, SeparationEvent::Burnout, Some(idx));
            }
            FlightEventKind::EjectionCharge => {
                let Some(idx) = stage.filter(|&i| status.configuration.is_active(i)) else {
                    return Ok(false);
                };
                self.schedule_deployments(status, now, |t| matches!(t, DeployTrigger::Ejection), Some(idx));
                self.schedule_separations(status, now, SeparationEvent::Ejection, Some(idx));
            }
            FlightEventKind::Apogee => {
                status.flags.apogee_reached = true;
                self.schedule_deployments(status, now, |t| matches!(t, DeployTrigger::Apogee), None);
            }
            FlightEventKind::RecoveryDeviceDeployment => {
                let Some(EventSource::RecoveryDevice { stage, index }) = event.source.clone() else {
                    return Ok(true);
                };
                let device = DeviceRef { stage, index };
                if !status.configuration.is_active(stage) || !status.configuration.deploy(device) {
                    return Ok(false);
                }
                self.deployment_checks(status)?;
            }
            FlightEventKind::StageSeparation => {
                let Some(idx) = stage else { return Ok(false) };
                if status.configuration.bottom_stage() != Some(idx) || status.configuration.active_count() < 2 {
                    return Ok(false);
                }
                self.separate(status, idx, now);
            }
            FlightEventKind::GroundHit => status.terminate(TerminationReason::GroundHit),
            FlightEventKind::SimulationEnd | FlightEventKind::Abort | FlightEventKind::Exception => {}
        }
        Ok(true)
    }

    fn schedule_deployments(
        &self,
        status: &mut SimulationStatus,
        now: f64,
        wanted: impl Fn(DeployTrigger) -> bool,
        only_stage: Option<usize>,
    ) {
        let mut scheduled = vec![];
        for (stage_idx, stage) in status.configuration.active_stages() {
            if only_stage.is_some_and(|s| s != stage_idx) {
                continue;
            }
            for (index, device) in stage.recovery.iter().enumerate() {
                if wanted(device.trigger) {
                    scheduled.push((now + device.delay, EventSource::RecoveryDevice { stage: stage_idx, index }));
                }
            }
        }
        for (time, source) in scheduled {
            status.add_event(FlightEventKind::RecoveryDeviceDeployment, time, Some(source));
        }
    }

    fn schedule_separations(
        &self,
        status: &mut SimulationStatus,
        now: f64,
        trigger: SeparationEvent,
        only_stage: Option<usize>,
    ) {
        let scheduled: Vec<(f64, usize)> = status
            .configuration
            .active_stages()
            .filter(|&(i, s)| s.separation.event == trigger && only_stage.map_or(true, |o| o == i))
            .map(|(i, s)| (now + s.separation.delay, i))
            .collect();
        for (time, idx) in scheduled {
            status.add_event(FlightEventKind::StageSeparation, time, Some(EventSource::Stage(idx)));
        }
    }

    /// Hand the bottom stage its own branch and light the next stage.
    fn separate(&mut self, status: &mut SimulationStatus, idx: usize, now: f64) {
        let detached = status.configuration.separate(idx);
        let name = detached
            .rocket()
            .stage(idx)
            .map_or_else(|| format!("Stage {idx}"), |s| s.name.clone());
        let mut booster = SimulationStatus::new(
            status.state.clone(),
            detached,
            Arc::clone(&status.conditions),
            name,
        );
        booster.flags = status.flags.clone();
        booster.warnings = status.warnings.clone();
        booster.queue = status.queue.split_off(|e| e.source_stage() == Some(idx));
        info!(branch = booster.branch.name(), time = now, "stage separated");
        self.pending.push_back(booster);

        if let Some(next) = status.configuration.bottom_stage() {
            if let Some(delay) = status.configuration.mount(next).map(|m| m.ignition_delay) {
                status.add_event(FlightEventKind::Ignition, now + delay, Some(EventSource::Stage(next)));
            }
        }
    }

    fn launch_checks(&mut self, status: &mut SimulationStatus) -> Result<(), BranchFailure> {
        let mut sink = WarningSet::new();
        let mass = self.mass.mass_data(&status.configuration, status.state.time, &mut sink)?;
        let atm = atmosphere::isa(self.conditions.launch_altitude);
        let aero = self.aerodynamics.forces(
            &status.configuration,
            &AeroConditions {
                mach: STABILITY_CHECK_MACH,
                aoa: 0.0,
                airspeed: STABILITY_CHECK_MACH * atm.sound_speed,
                density: atm.density,
                kinematic_viscosity: atm.kinematic_viscosity,
                pitch_rate: 0.0,
                roll_rate: 0.0,
                cg: mass.cg,
                thrusting: false,
            },
            &mut sink,
        )?;
        if aero.cp < mass.cg {
            sink.add(Warning::new(
                WarningKind::UnstableAtLaunch,
                format!("{:.2} calibers", aero.stability(mass.cg)),
            ));
        }
        if !status.configuration.has_recovery() {
            sink.add(Warning::new(WarningKind::NoRecoveryDevice, ""));
        }
        self.absorb_warnings(status, sink)
    }

    fn deployment_checks(&mut self, status: &mut SimulationStatus) -> Result<(), BranchFailure> {
        let time = status.state.time;
        let altitude = self.conditions.launch_altitude + status.state.pos.z;
        let airspeed = (status.state.vel - self.wind.velocity(time, altitude)).norm();
        let mut sink = WarningSet::new();
        if airspeed > MAX_DEPLOYMENT_SPEED {
            sink.add(Warning::new(WarningKind::RecoveryHighSpeed, format!("{airspeed:.1} m/s")));
        }
        if status.configuration.is_burning(time) {
            sink.add(Warning::new(WarningKind::RecoveryWhileBurning, ""));
        }
        self.absorb_warnings(status, sink)
    }

    /// Merge calculator warnings, notifying listeners of the new ones.
    fn absorb_warnings(&mut self, status: &mut SimulationStatus, sink: WarningSet) -> Result<(), BranchFailure> {
        for warning in status.warnings.absorb(sink) {
            warn!(time = status.state.time, warning = %warning, "simulation warning");
            if let ChainOutcome::Abort { listener } = self.listeners.on_warning(status, &warning)? {
                self.abort(status, listener);
            }
        }
        Ok(())
    }

    fn record_sample(&self, status: &mut SimulationStatus) -> Result<(), BranchFailure> {
        let ctx = DerivativeContext::new(
            &status.configuration,
            &self.conditions,
            self.aerodynamics.as_ref(),
            self.mass.as_ref(),
            self.wind.as_ref(),
            !status.flags.rod_cleared,
        );
        let (_, data) = ctx.evaluate_full(&status.state)?;
        drop(ctx);
        status.branch.push_sample(Sample { state: status.state.clone(), data });
        Ok(())
    }

    /// The first termination reason wins, so a second abort in the same step is a no-op.
    fn abort(&self, status: &mut SimulationStatus, listener: String) {
        status.terminate(TerminationReason::Aborted { listener });
    }

    fn close_branch(&mut self, status: &mut SimulationStatus) {
        let time = status.state.time;
        let reason = status.termination.clone().unwrap_or(TerminationReason::Requested);
        if let TerminationReason::Aborted { listener } = &reason {
            status.branch.push_event(FlightEvent::new(
                FlightEventKind::Abort,
                time,
                Some(EventSource::Listener(listener.clone())),
            ));
        }
        status
            .branch
            .push_event(FlightEvent::new(FlightEventKind::SimulationEnd, time, None));
        status.branch.set_termination(reason.clone());
        status.phase = RunPhase::Terminated;
        info!(
            branch = status.branch.name(),
            time,
            apogee = status.branch.max_altitude(),
            reason = %reason,
            "branch finished"
        );
    }
}

fn check_finite(state: &State) -> Result<(), ModelError> {
    if state.is_finite() {
        Ok(())
    } else {
        Err(ModelError::NonFinite { quantity: "state", time: state.time })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::ErrorCategory;
    use crate::sim::integrator::{DerivativeFn, StepOutcome};
    use crate::sim::listener::HookResult;
    use crate::vehicle::presets;
    use FlightEventKind::*;

    fn setup(rocket: Rocket, config: &str) -> SimulationSetup {
        SimulationSetup::new(
            Arc::new(rocket),
            Conditions::default().with_motor_configuration(config),
        )
    }

    fn ballistic() -> SimulationSetup {
        setup(presets::ballistic_rocket(), "F60")
    }

    fn core_kinds(branch: &FlightDataBranch) -> Vec<FlightEventKind> {
        branch
            .event_kinds()
            .into_iter()
            .filter(|k| matches!(k, Launch | Ignition | Burnout | Apogee | GroundHit))
            .collect()
    }

    fn main(data: &FlightData) -> &FlightDataBranch {
        data.main_branch().expect("main branch")
    }

    struct AbortAt(f64);

    impl SimulationListener for AbortAt {
        fn name(&self) -> &str {
            "abort-at"
        }

        fn pre_step(&mut self, status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            Ok(if status.time() >= self.0 { HookResult::Abort } else { HookResult::Continue })
        }
    }

    struct FailAfter(f64);

    impl SimulationListener for FailAfter {
        fn name(&self) -> &str {
            "fail-after"
        }

        fn post_step(&mut self, status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            if status.time() > self.0 {
                Err(ListenerError::new("sensor model diverged"))
            } else {
                Ok(HookResult::Continue)
            }
        }
    }

    struct NanStepper;

    impl Stepper for NanStepper {
        fn name(&self) -> &str {
            "nan"
        }

        fn step(&self, state: &State, _f: &DerivativeFn<'_>, dt: f64) -> Result<StepOutcome, ModelError> {
            let mut next = state.clone();
            next.time += dt;
            if next.time > 1.0 {
                next.pos.z = f64::NAN;
            }
            Ok(StepOutcome { state: next, error_estimate: 0.0 })
        }
    }

    struct LateEvents {
        fired: bool,
    }

    impl SimulationListener for LateEvents {
        fn name(&self) -> &str {
            "late-events"
        }

        fn post_step(&mut self, status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            if !self.fired && status.time() >= 3.0 {
                self.fired = true;
                status.add_event(Liftoff, 1.0, None);
                status.add_event(EjectionCharge, 1.0, Some(EventSource::Stage(0)));
            }
            Ok(HookResult::Continue)
        }
    }

    /// Keeps the rocket on the pad by advancing time itself until `until`.
    struct HoldOnPad {
        until: f64,
    }

    impl SimulationListener for HoldOnPad {
        fn name(&self) -> &str {
            "hold-on-pad"
        }

        fn pre_step(&mut self, status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            if status.time() < self.until - 1e-9 {
                status.state_mut().time += 0.05;
                Ok(HookResult::SkipStep)
            } else {
                Ok(HookResult::Continue)
            }
        }
    }

    struct Stall;

    impl SimulationListener for Stall {
        fn name(&self) -> &str {
            "stall"
        }

        fn pre_step(&mut self, status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            Ok(if status.time() >= 1.0 { HookResult::SkipStep } else { HookResult::Continue })
        }
    }

    /// Records every warning it is told about.
    struct WarningLog(Arc<Mutex<Vec<WarningKind>>>);

    impl SimulationListener for WarningLog {
        fn name(&self) -> &str {
            "warning-log"
        }

        fn on_warning(&mut self, _status: &mut SimulationStatus, warning: &Warning) -> Result<HookResult, ListenerError> {
            self.0.lock().expect("lock").push(warning.kind);
            Ok(HookResult::Continue)
        }
    }

    /// Aborts on the first warning of `kind`, then asks to abort again from every later `post_step`.
    struct AbortOnWarning {
        kind: WarningKind,
        seen: bool,
        late_post_steps: Arc<Mutex<usize>>,
    }

    impl AbortOnWarning {
        fn new(kind: WarningKind) -> (Self, Arc<Mutex<usize>>) {
            let counter = Arc::new(Mutex::new(0));
            (Self { kind, seen: false, late_post_steps: Arc::clone(&counter) }, counter)
        }
    }

    impl SimulationListener for AbortOnWarning {
        fn name(&self) -> &str {
            "abort-on-warning"
        }

        fn post_step(&mut self, _status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            if self.seen {
                *self.late_post_steps.lock().expect("lock") += 1;
                return Ok(HookResult::Abort);
            }
            Ok(HookResult::Continue)
        }

        fn on_warning(&mut self, _status: &mut SimulationStatus, warning: &Warning) -> Result<HookResult, ListenerError> {
            if warning.kind == self.kind {
                self.seen = true;
                return Ok(HookResult::Abort);
            }
            Ok(HookResult::Continue)
        }
    }

    #[test]
    fn single_stage_event_order() {
        let data = SimulationEngine::default().simulate(&ballistic(), vec![]).expect("run");
        let branch = main(&data);
        assert_eq!(core_kinds(branch), vec![Launch, Ignition, Burnout, Apogee, GroundHit]);
        assert_eq!(branch.event_kinds().last(), Some(&SimulationEnd));
        assert_eq!(branch.event_kinds().iter().filter(|&&k| k == Apogee).count(), 1);

        let burnout = branch.first_event(Burnout).expect("burnout");
        assert_eq!(burnout.time, 2.0);
        let apogee = branch.first_event(Apogee).expect("apogee");
        assert!(apogee.time > 2.0);
        assert!(branch.first_event(Liftoff).is_some());
        assert!(branch.first_event(LaunchRodCleared).is_some());
        assert_eq!(branch.termination(), Some(&TerminationReason::GroundHit));
        assert!(data.warnings().contains(WarningKind::NoRecoveryDevice));
        assert!(!data.warnings().contains(WarningKind::UnstableAtLaunch));
        assert_eq!(data.branches().len(), 1);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let engine = SimulationEngine::default();
        let mut s = ballistic();
        s.conditions.wind_speed_average = 4.0;
        s.conditions.wind_turbulence_intensity = 0.2;
        s.conditions.random_seed = 42;
        let a = engine.simulate(&s, vec![]).expect("run");
        let b = engine.simulate(&s, vec![]).expect("run");
        assert_eq!(main(&a).events(), main(&b).events());
        assert_eq!(main(&a).samples().len(), main(&b).samples().len());
        assert_eq!(a, b);
    }

    #[test]
    fn time_never_goes_backwards() {
        let data = SimulationEngine::default()
            .simulate(&setup(presets::two_stage(), "F60-F60"), vec![])
            .expect("run");
        for branch in data.branches() {
            assert!(branch.samples().windows(2).all(|w| w[0].state.time <= w[1].state.time));
            assert!(branch.events().windows(2).all(|w| w[0].time <= w[1].time));
        }
    }

    #[test]
    fn propellant_never_negative_and_empty_at_burnout() {
        let data = SimulationEngine::default().simulate(&ballistic(), vec![]).expect("run");
        let branch = main(&data);
        assert!(branch.samples().iter().all(|s| s.data.propellant_mass >= 0.0));
        let burnout = branch.first_event(Burnout).expect("burnout").time;
        let at_burnout = branch
            .samples()
            .iter()
            .find(|s| s.state.time == burnout)
            .expect("a sample lands on burnout");
        assert_eq!(at_burnout.data.propellant_mass, 0.0);
        let before = branch.samples().iter().filter(|s| s.state.time < burnout).last().expect("earlier sample");
        assert!(before.data.propellant_mass > 0.0);
    }

    #[test]
    fn abort_ends_run_at_requested_time() {
        let engine = SimulationEngine::default();
        let data = engine.simulate(&ballistic(), vec![Box::new(AbortAt(3.0))]).expect("run");
        let branch = main(&data);
        let last = branch.last_time().expect("samples");
        assert!(last >= 3.0 && last < 3.0 + 0.01 + 1e-9, "last sample at {last}");
        let kinds = branch.event_kinds();
        assert_eq!(kinds.last(), Some(&SimulationEnd));
        assert_eq!(kinds[kinds.len() - 2], Abort);
        assert_eq!(
            branch.termination(),
            Some(&TerminationReason::Aborted { listener: "abort-at".into() })
        );
    }

    #[test]
    fn precondition_failures_run_nothing() {
        let engine = SimulationEngine::default();

        let mut s = ballistic();
        s.conditions.motor_configuration = None;
        assert!(matches!(engine.simulate(&s, vec![]), Err(SimulationError::NoMotorConfiguration)));

        let s = setup(presets::ballistic_rocket(), "G80");
        assert!(matches!(
            engine.simulate(&s, vec![]),
            Err(SimulationError::MissingMotorConfiguration(id)) if id == "G80"
        ));

        let mut s = ballistic();
        s.strategies.stepper = "adaptive".into();
        let err = engine.simulate(&s, vec![]).unwrap_err();
        assert!(matches!(err, SimulationError::UnknownStrategy { .. }));
        assert!(err.partial_data().is_none());

        let mut s = ballistic();
        s.listeners = vec!["log-events".into(), "nope".into()];
        assert!(matches!(engine.simulate(&s, vec![]), Err(SimulationError::UnknownStrategy { .. })));

        let mut s = ballistic();
        s.conditions.time_step = -1.0;
        assert!(matches!(engine.simulate(&s, vec![]), Err(SimulationError::InvalidConditions(_))));
    }

    #[test]
    fn listener_instantiation_failure_is_fatal() {
        let mut registry = Registry::with_defaults();
        registry.register_listener("needs-file", || Err(ListenerError::new("missing calibration")));
        let engine = SimulationEngine::new(Arc::new(registry));
        let mut s = ballistic();
        s.listeners = vec!["needs-file".into()];
        let err = engine.simulate(&s, vec![]).unwrap_err();
        assert!(matches!(err, SimulationError::ListenerInstantiation { ref id, .. } if id == "needs-file"));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn listener_failure_keeps_partial_data() {
        let err = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(FailAfter(1.0))])
            .unwrap_err();
        assert!(!err.is_retryable());
        match &err {
            SimulationError::Listener { listener, time, .. } => {
                assert_eq!(listener, "fail-after");
                assert!(*time > 1.0 && *time < 1.02);
            }
            other => panic!("unexpected error {other}"),
        }
        let partial = err.partial_data().expect("partial data");
        let branch = main(partial);
        assert_eq!(branch.event_kinds().last(), Some(&Exception));
        assert!(branch.last_time().expect("samples") <= 1.0 + 1e-9);
    }

    #[test]
    fn non_finite_state_is_a_retryable_model_failure() {
        let mut registry = Registry::with_defaults();
        registry.register_stepper("nan", || Box::new(NanStepper));
        let engine = SimulationEngine::new(Arc::new(registry));
        let mut s = ballistic();
        s.strategies.stepper = "nan".into();
        let err = engine.simulate(&s, vec![]).unwrap_err();
        assert!(matches!(err, SimulationError::Model { source: ModelError::NonFinite { .. }, .. }));
        assert!(err.is_retryable());
        assert!(main(err.partial_data().expect("partial")).samples().len() > 50);
    }

    #[test]
    fn two_stage_flight_branches() {
        let data = SimulationEngine::default()
            .simulate(&setup(presets::two_stage(), "F60-F60"), vec![])
            .expect("run");
        assert_eq!(data.branches().len(), 2);

        let sustainer = main(&data);
        let separation = sustainer.first_event(StageSeparation).expect("separation");
        assert_eq!(separation.time, 2.0);
        let ignitions: Vec<f64> = sustainer
            .events()
            .iter()
            .filter(|e| e.kind == Ignition)
            .map(|e| e.time)
            .collect();
        assert_eq!(ignitions, vec![0.0, 2.5]);
        assert!(sustainer.first_event(RecoveryDeviceDeployment).is_some());

        let booster = data.branch(1).expect("booster branch");
        assert_eq!(booster.name(), "Booster");
        assert_eq!(booster.samples().first().map(|s| s.state.time), Some(2.0));
        assert!(booster.first_event(Apogee).is_some());
        assert_eq!(booster.termination(), Some(&TerminationReason::GroundHit));
        assert!(sustainer.max_altitude() > booster.max_altitude());

        let single = SimulationEngine::default()
            .simulate(&setup(presets::sounding_rocket(), "F60"), vec![])
            .expect("run");
        assert!(sustainer.max_altitude() > main(&single).max_altitude());
    }

    #[test]
    fn parachute_slows_descent() {
        let engine = SimulationEngine::default();
        let chute = engine.simulate(&setup(presets::sounding_rocket(), "F60"), vec![]).expect("run");
        let free = engine.simulate(&ballistic(), vec![]).expect("run");
        let branch = main(&chute);
        let apogee = branch.first_event(Apogee).expect("apogee").time;
        let deploy = branch.first_event(RecoveryDeviceDeployment).expect("deployment").time;
        assert!((deploy - apogee - 1.0).abs() < 1e-6);
        let with_chute = chute.summary().expect("summary").impact_speed;
        let without = free.summary().expect("summary").impact_speed;
        assert!(with_chute < 15.0, "impact at {with_chute} m/s");
        assert!(without > 2.0 * with_chute);
        assert!(!chute.warnings().contains(WarningKind::RecoveryHighSpeed));
    }

    #[test]
    fn stop_at_apogee_by_name() {
        let mut s = ballistic();
        s.listeners = vec!["stop-at-apogee".into(), "log-events".into()];
        let data = SimulationEngine::default().simulate(&s, vec![]).expect("run");
        let kinds = main(&data).event_kinds();
        assert_eq!(kinds[kinds.len() - 2], Apogee);
        assert_eq!(main(&data).termination(), Some(&TerminationReason::Requested));
    }

    #[test]
    fn finless_rocket_is_unstable_at_launch() {
        let mut rocket = presets::ballistic_rocket();
        rocket.stages_mut()[0].fins.clear();
        let mut s = setup(rocket, "F60");
        s.conditions.max_time = 1.0;
        let data = SimulationEngine::default().simulate(&s, vec![]).expect("run");
        assert!(data.warnings().contains(WarningKind::UnstableAtLaunch));
        assert_eq!(main(&data).termination(), Some(&TerminationReason::MaxTime));
        assert_eq!(main(&data).last_time(), Some(1.0));
    }

    #[test]
    fn runs_with_a_scoped_dispatch() {
        let engine = SimulationEngine::default().with_dispatch(Dispatch::none());
        let mut s = ballistic();
        s.conditions.max_time = 0.5;
        let data = engine.simulate(&s, vec![]).expect("run");
        assert_eq!(main(&data).termination(), Some(&TerminationReason::MaxTime));
    }

    #[test]
    fn abort_stops_separated_branches() {
        let data = SimulationEngine::default()
            .simulate(&setup(presets::two_stage(), "F60-F60"), vec![Box::new(AbortAt(3.0))])
            .expect("run");
        assert_eq!(data.branches().len(), 2);
        let aborted = TerminationReason::Aborted { listener: "abort-at".into() };
        for branch in data.branches() {
            assert_eq!(branch.termination(), Some(&aborted));
            let kinds = branch.event_kinds();
            assert_eq!(kinds.last(), Some(&SimulationEnd));
            assert_eq!(kinds[kinds.len() - 2], Abort);
            assert_eq!(kinds.iter().filter(|&&k| k == Abort).count(), 1);
            assert!(branch.last_time().expect("samples") < 3.0 + 0.01 + 1e-9);
        }

        let booster = data.branch(1).expect("booster branch");
        assert_eq!(booster.name(), "Booster");
        assert_eq!(booster.samples().len(), 1);
        assert_eq!(booster.last_time(), Some(2.0));
        assert!(booster.first_event(GroundHit).is_none());
        assert!(booster.first_event(Apogee).is_none());
    }

    #[test]
    fn late_listener_events_keep_time_order() {
        let data = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(LateEvents { fired: false })])
            .expect("run");
        let branch = main(&data);
        assert!(branch.events().windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(branch.event_kinds().iter().filter(|&&k| k == Liftoff).count(), 1);
        assert!(branch.first_event(Liftoff).expect("liftoff").time < 1.0);
        let ejection = branch.first_event(EjectionCharge).expect("ejection charge");
        assert!(ejection.time >= 3.0 && ejection.time < 3.0 + 0.01 + 1e-9, "ejection at {}", ejection.time);
        assert_eq!(branch.termination(), Some(&TerminationReason::GroundHit));
    }

    #[test]
    fn skip_step_lets_a_listener_advance_time() {
        let data = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(HoldOnPad { until: 0.5 })])
            .expect("run");
        let branch = main(&data);
        let held: Vec<&Sample> = branch.samples().iter().filter(|s| s.state.time < 0.5 - 1e-6).collect();
        assert_eq!(held.len(), 10);
        assert!(held.iter().all(|s| s.state.pos.z == 0.0 && s.state.vel.norm() == 0.0));
        assert!(branch.samples().windows(2).all(|w| w[0].state.time < w[1].state.time));
        assert!(branch.first_event(Liftoff).expect("liftoff").time > 0.5 - 1e-6);
        assert_eq!(branch.first_event(Burnout).expect("burnout").time, 2.0);
        assert_eq!(branch.termination(), Some(&TerminationReason::GroundHit));
    }

    #[test]
    fn skip_step_without_advancing_time_fails() {
        let err = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(Stall)])
            .unwrap_err();
        match &err {
            SimulationError::Listener { listener, time, source, .. } => {
                assert_eq!(listener, "stall");
                assert!(*time >= 1.0 && *time < 1.0 + 0.01 + 1e-9);
                assert_eq!(source.message, "step skipped without advancing time");
            }
            other => panic!("unexpected error {other}"),
        }
        let partial = err.partial_data().expect("partial data");
        assert_eq!(main(partial).event_kinds().last(), Some(&Exception));
    }

    #[test]
    fn warnings_reach_listeners_once() {
        let seen = Arc::new(Mutex::new(vec![]));
        let data = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(WarningLog(Arc::clone(&seen)))])
            .expect("run");
        let seen = seen.lock().expect("lock");
        assert_eq!(seen.iter().filter(|&&k| k == WarningKind::NoRecoveryDevice).count(), 1);
        assert!(seen.contains(&WarningKind::LargeAngleOfAttack));
        assert!(seen.iter().all(|&k| data.warnings().contains(k)));
    }

    #[test]
    fn abort_from_warning_hook_ends_at_launch() {
        let (listener, _) = AbortOnWarning::new(WarningKind::NoRecoveryDevice);
        let data = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(listener)])
            .expect("run");
        let branch = main(&data);
        assert_eq!(branch.event_kinds(), vec![Launch, Abort, SimulationEnd]);
        assert_eq!(
            branch.termination(),
            Some(&TerminationReason::Aborted { listener: "abort-on-warning".into() })
        );
        assert_eq!(branch.last_time(), Some(0.0));
    }

    #[test]
    fn abort_during_a_step_skips_the_rest_of_it() {
        let (listener, late_post_steps) = AbortOnWarning::new(WarningKind::LargeAngleOfAttack);
        let data = SimulationEngine::default()
            .simulate(&ballistic(), vec![Box::new(listener)])
            .expect("run");
        let branch = main(&data);
        assert_eq!(*late_post_steps.lock().expect("lock"), 0);

        let kinds = branch.event_kinds();
        assert_eq!(kinds.iter().filter(|&&k| k == Abort).count(), 1);
        assert_eq!(kinds.last(), Some(&SimulationEnd));
        assert!(branch.first_event(GroundHit).is_none());
        let apogee = branch.first_event(Apogee).expect("apogee").time;
        let abort = branch.first_event(Abort).expect("abort").time;
        assert!(abort > apogee);
        assert!(branch.last_time().expect("samples") < abort);
    }

    #[test]
    fn early_deployment_raises_recovery_warnings() {
        let mut rocket = presets::sounding_rocket();
        rocket.stages_mut()[0].recovery[0].trigger = DeployTrigger::Launch;
        let mut s = setup(rocket, "F60");
        s.conditions.max_time = 3.0;
        let data = SimulationEngine::default().simulate(&s, vec![]).expect("run");
        let deploy = main(&data).first_event(RecoveryDeviceDeployment).expect("deployment");
        assert_eq!(deploy.time, 1.0);
        assert!(data.warnings().contains(WarningKind::RecoveryHighSpeed));
        assert!(data.warnings().contains(WarningKind::RecoveryWhileBurning));
        assert!(!data.warnings().contains(WarningKind::NoRecoveryDevice));
    }
}
