use tracing::{debug, info};

use crate::error::{ListenerError, SimulationError};

use super::event::{FlightEvent, FlightEventKind};
use super::flight_data::FlightData;
use super::status::SimulationStatus;
use super::warning::Warning;

// ---------------------------------------------------------------------------
// Listener hooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    Continue,
    /// The listener changed the status; derived quantities must be recomputed.
    Modified,
    /// Only honoured from `pre_step`: the listener advanced the state itself.
    SkipStep,
    /// End the run now.
    Abort,
}

/// Extension hooks invoked synchronously by the engine.
///
/// Every method has a no-op default so listeners only implement what they need.
pub trait SimulationListener: Send {
    fn name(&self) -> &str {
        "unnamed"
    }

    fn start_simulation(&mut self, _status: &mut SimulationStatus) -> Result<(), ListenerError> {
        Ok(())
    }

    fn pre_step(&mut self, _status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
        Ok(HookResult::Continue)
    }

    fn post_step(&mut self, _status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
        Ok(HookResult::Continue)
    }

    fn handle_event(
        &mut self,
        _status: &mut SimulationStatus,
        _event: &FlightEvent,
    ) -> Result<HookResult, ListenerError> {
        Ok(HookResult::Continue)
    }

    fn on_warning(
        &mut self,
        _status: &mut SimulationStatus,
        _warning: &Warning,
    ) -> Result<HookResult, ListenerError> {
        Ok(HookResult::Continue)
    }

    fn end_simulation(&mut self, _outcome: Result<&FlightData, &SimulationError>) {}
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Combined result of running one hook over the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Continue,
    Modified,
    SkipStep,
    Abort { listener: String },
}

#[derive(Debug)]
pub struct HookFailure {
    pub listener: String,
    pub error: ListenerError,
}

/// Listeners in registration order.
#[derive(Default)]
pub struct ListenerChain {
    listeners: Vec<Box<dyn SimulationListener>>,
}

impl ListenerChain {
    pub fn new(listeners: Vec<Box<dyn SimulationListener>>) -> Self {
        Self { listeners }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.listeners.iter().map(|l| l.name().to_string()).collect()
    }

    /// Run `hook` on each listener until one aborts or fails.
    fn dispatch<F>(&mut self, mut hook: F) -> Result<ChainOutcome, HookFailure>
    where
        F: FnMut(&mut dyn SimulationListener) -> Result<HookResult, ListenerError>,
    {
        let mut outcome = ChainOutcome::Continue;
        for listener in &mut self.listeners {
            let result = hook(listener.as_mut()).map_err(|error| HookFailure {
                listener: listener.name().to_string(),
                error,
            })?;
            match result {
                HookResult::Continue => {}
                HookResult::Modified => {
                    if outcome == ChainOutcome::Continue {
                        outcome = ChainOutcome::Modified;
                    }
                }
                HookResult::SkipStep => outcome = ChainOutcome::SkipStep,
                HookResult::Abort => {
                    let name = listener.name().to_string();
                    debug!(listener = %name, "listener aborted the run");
                    return Ok(ChainOutcome::Abort { listener: name });
                }
            }
        }
        Ok(outcome)
    }

    pub fn start_simulation(&mut self, status: &mut SimulationStatus) -> Result<(), HookFailure> {
        for listener in &mut self.listeners {
            listener.start_simulation(status).map_err(|error| HookFailure {
                listener: listener.name().to_string(),
                error,
            })?;
        }
        Ok(())
    }

    pub fn pre_step(&mut self, status: &mut SimulationStatus) -> Result<ChainOutcome, HookFailure> {
        self.dispatch(|l| l.pre_step(status))
    }

    pub fn post_step(&mut self, status: &mut SimulationStatus) -> Result<ChainOutcome, HookFailure> {
        let outcome = self.dispatch(|l| l.post_step(status))?;
        // Skipping is meaningless once the step is done.
        Ok(match outcome {
            ChainOutcome::SkipStep => ChainOutcome::Continue,
            other => other,
        })
    }

    pub fn handle_event(
        &mut self,
        status: &mut SimulationStatus,
        event: &FlightEvent,
    ) -> Result<ChainOutcome, HookFailure> {
        self.dispatch(|l| l.handle_event(status, event))
    }

    pub fn on_warning(
        &mut self,
        status: &mut SimulationStatus,
        warning: &Warning,
    ) -> Result<ChainOutcome, HookFailure> {
        self.dispatch(|l| l.on_warning(status, warning))
    }

    pub fn end_simulation(&mut self, outcome: Result<&FlightData, &SimulationError>) {
        for listener in &mut self.listeners {
            listener.end_simulation(outcome);
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in listeners
// ---------------------------------------------------------------------------

/// Logs every flight event at info level.
#[derive(Debug, Default)]
pub struct EventLogListener;

impl SimulationListener for EventLogListener {
    fn name(&self) -> &str {
        "log-events"
    }

    fn handle_event(
        &mut self,
        status: &mut SimulationStatus,
        event: &FlightEvent,
    ) -> Result<HookResult, ListenerError> {
        info!(
            branch = status.branch().name(),
            kind = %event.kind,
            time = event.time,
            altitude = status.state().altitude(),
            "flight event"
        );
        Ok(HookResult::Continue)
    }
}

/// Ends each branch at apogee.
#[derive(Debug, Default)]
pub struct StopAtApogee;

impl SimulationListener for StopAtApogee {
    fn name(&self) -> &str {
        "stop-at-apogee"
    }

    fn handle_event(
        &mut self,
        status: &mut SimulationStatus,
        event: &FlightEvent,
    ) -> Result<HookResult, ListenerError> {
        if event.kind == FlightEventKind::Apogee {
            status.request_termination();
        }
        Ok(HookResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::state::State;
    use crate::sim::conditions::Conditions;
    use crate::sim::status::FlightConfiguration;
    use crate::vehicle::presets;
    use nalgebra::UnitQuaternion;
    use std::sync::{Arc, Mutex};

    fn status() -> SimulationStatus {
        let config = FlightConfiguration::new(Arc::new(presets::sounding_rocket()), "F60")
            .expect("preset configuration");
        SimulationStatus::new(
            State::at_rest(UnitQuaternion::identity()),
            config,
            Arc::new(Conditions::default()),
            "Main",
        )
    }

    struct Scripted {
        name: &'static str,
        result: Result<HookResult, ListenerError>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl SimulationListener for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn pre_step(&mut self, _status: &mut SimulationStatus) -> Result<HookResult, ListenerError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(self.name);
            }
            self.result.clone()
        }
    }

    fn scripted(
        name: &'static str,
        result: Result<HookResult, ListenerError>,
        calls: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<dyn SimulationListener> {
        Box::new(Scripted { name, result, calls: Arc::clone(calls) })
    }

    #[test]
    fn runs_in_order_and_stops_at_abort() {
        let calls = Arc::new(Mutex::new(vec![]));
        let mut chain = ListenerChain::new(vec![
            scripted("a", Ok(HookResult::Modified), &calls),
            scripted("b", Ok(HookResult::Abort), &calls),
            scripted("c", Ok(HookResult::Continue), &calls),
        ]);
        let mut s = status();
        let outcome = chain.pre_step(&mut s).expect("no failure");
        assert_eq!(outcome, ChainOutcome::Abort { listener: "b".into() });
        assert_eq!(*calls.lock().expect("lock"), vec!["a", "b"]);
    }

    #[test]
    fn skip_wins_over_modified() {
        let calls = Arc::new(Mutex::new(vec![]));
        let mut chain = ListenerChain::new(vec![
            scripted("a", Ok(HookResult::SkipStep), &calls),
            scripted("b", Ok(HookResult::Modified), &calls),
        ]);
        let mut s = status();
        assert_eq!(chain.pre_step(&mut s).expect("no failure"), ChainOutcome::SkipStep);
        assert_eq!(chain.post_step(&mut s).expect("no failure"), ChainOutcome::Continue);
    }

    #[test]
    fn failure_names_the_listener() {
        let calls = Arc::new(Mutex::new(vec![]));
        let mut chain = ListenerChain::new(vec![
            scripted("ok", Ok(HookResult::Continue), &calls),
            scripted("bad", Err(ListenerError::new("boom")), &calls),
        ]);
        let mut s = status();
        let failure = chain.pre_step(&mut s).unwrap_err();
        assert_eq!(failure.listener, "bad");
        assert_eq!(failure.error.message, "boom");
    }

    #[test]
    fn stop_at_apogee_requests_termination() {
        let mut s = status();
        let mut l = StopAtApogee;
        let burnout = FlightEvent::new(FlightEventKind::Burnout, 2.0, None);
        l.handle_event(&mut s, &burnout).expect("hook");
        assert!(s.termination().is_none());
        let apogee = FlightEvent::new(FlightEventKind::Apogee, 9.0, None);
        l.handle_event(&mut s, &apogee).expect("hook");
        assert!(s.termination().is_some());
    }
}
