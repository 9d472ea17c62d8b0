use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use crate::dynamics::state::State;

// ---------------------------------------------------------------------------
// Flight events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightEventKind {
    Launch,
    Ignition,
    Liftoff,
    LaunchRodCleared,
    Burnout,
    EjectionCharge,
    Apogee,
    RecoveryDeviceDeployment,
    StageSeparation,
    GroundHit,
    SimulationEnd,
    Abort,
    Exception,
}

impl fmt::Display for FlightEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightEventKind::Launch => "LAUNCH",
            FlightEventKind::Ignition => "IGNITION",
            FlightEventKind::Liftoff => "LIFTOFF",
            FlightEventKind::LaunchRodCleared => "LAUNCH_ROD_CLEARED",
            FlightEventKind::Burnout => "BURNOUT",
            FlightEventKind::EjectionCharge => "EJECTION_CHARGE",
            FlightEventKind::Apogee => "APOGEE",
            FlightEventKind::RecoveryDeviceDeployment => "RECOVERY_DEVICE_DEPLOYMENT",
            FlightEventKind::StageSeparation => "STAGE_SEPARATION",
            FlightEventKind::GroundHit => "GROUND_HIT",
            FlightEventKind::SimulationEnd => "SIMULATION_END",
            FlightEventKind::Abort => "ABORT",
            FlightEventKind::Exception => "EXCEPTION",
        };
        f.write_str(name)
    }
}

/// What caused an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Stage(usize),
    RecoveryDevice { stage: usize, index: usize },
    Listener(String),
}

impl EventSource {
    pub fn stage(&self) -> Option<usize> {
        match *self {
            EventSource::Stage(stage) | EventSource::RecoveryDevice { stage, .. } => Some(stage),
            EventSource::Listener(_) => None,
        }
    }
}

/// A discrete event. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightEvent {
    pub kind: FlightEventKind,
    pub time: f64,
    pub source: Option<EventSource>,
}

impl FlightEvent {
    pub fn new(kind: FlightEventKind, time: f64, source: Option<EventSource>) -> Self {
        Self { kind, time, source }
    }

    pub fn source_stage(&self) -> Option<usize> {
        self.source.as_ref().and_then(EventSource::stage)
    }
}

// ---------------------------------------------------------------------------
// Event queue: time ordered, FIFO among equal times
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Queued {
    seq: u64,
    event: FlightEvent,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Reversed so the max-heap pops the earliest time, then the lowest sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Events due within this tolerance of the current time are dispatched.
pub const TIME_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: FlightEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued { seq, event });
    }

    pub fn peek(&self) -> Option<&FlightEvent> {
        self.heap.peek().map(|q| &q.event)
    }

    pub fn next_time(&self) -> Option<f64> {
        self.peek().map(|e| e.time)
    }

    pub fn pop(&mut self) -> Option<FlightEvent> {
        self.heap.pop().map(|q| q.event)
    }

    /// Pop the earliest event if it is due at `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<FlightEvent> {
        match self.next_time() {
            Some(t) if t <= now + TIME_TOLERANCE => self.pop(),
            _ => None,
        }
    }

    /// Whether an event of `kind` from `source` is still pending.
    pub fn contains(&self, kind: FlightEventKind, source: Option<&EventSource>) -> bool {
        self.heap
            .iter()
            .any(|q| q.event.kind == kind && q.event.source.as_ref() == source)
    }

    /// Move out every pending event matching `pred`, keeping relative order.
    pub fn split_off<F>(&mut self, mut pred: F) -> EventQueue
    where
        F: FnMut(&FlightEvent) -> bool,
    {
        let mut all: Vec<Queued> = std::mem::take(&mut self.heap).into_vec();
        all.sort_by(|a, b| b.cmp(a));
        let mut moved = EventQueue::new();
        for q in all {
            if pred(&q.event) {
                moved.push(q.event);
            } else {
                self.heap.push(q);
            }
        }
        moved
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

// ---------------------------------------------------------------------------
// Crossing tests between consecutive states
// ---------------------------------------------------------------------------

/// Vertical velocity changed sign from climbing to not climbing.
pub fn apogee_crossed(prev: &State, current: &State) -> bool {
    prev.vel.z > 0.0 && current.vel.z <= 0.0
}

/// Altitude passed downward through `altitude`.
pub fn descended_through(prev: &State, current: &State, altitude: f64) -> bool {
    prev.pos.z > altitude && current.pos.z <= altitude
}

/// Below the launch site while descending.
pub fn ground_reached(current: &State) -> bool {
    current.pos.z <= 0.0 && current.vel.z < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    fn make_state(alt: f64, vz: f64) -> State {
        State {
            time: 0.0,
            pos: Vector3::new(0.0, 0.0, alt),
            vel: Vector3::new(0.0, 0.0, vz),
            quat: UnitQuaternion::identity(),
            omega: Vector3::zeros(),
        }
    }

    fn ev(kind: FlightEventKind, time: f64) -> FlightEvent {
        FlightEvent::new(kind, time, None)
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.push(ev(FlightEventKind::Burnout, 2.0));
        q.push(ev(FlightEventKind::Launch, 0.0));
        q.push(ev(FlightEventKind::Apogee, 10.0));
        let order: Vec<f64> = std::iter::from_fn(|| q.pop()).map(|e| e.time).collect();
        assert_eq!(order, vec![0.0, 2.0, 10.0]);
    }

    #[test]
    fn equal_times_are_fifo() {
        let mut q = EventQueue::new();
        q.push(ev(FlightEventKind::Launch, 0.0));
        q.push(ev(FlightEventKind::Ignition, 0.0));
        q.push(ev(FlightEventKind::Liftoff, 0.0));
        let kinds: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![FlightEventKind::Launch, FlightEventKind::Ignition, FlightEventKind::Liftoff]
        );
    }

    #[test]
    fn pop_due_respects_current_time() {
        let mut q = EventQueue::new();
        q.push(ev(FlightEventKind::Burnout, 2.0));
        assert!(q.pop_due(1.99).is_none());
        assert!(q.pop_due(2.0).is_some());
        assert!(q.is_empty());
    }

    #[test]
    fn split_off_keeps_fifo() {
        let mut q = EventQueue::new();
        q.push(FlightEvent::new(FlightEventKind::Apogee, 5.0, Some(EventSource::Stage(0))));
        q.push(FlightEvent::new(FlightEventKind::Ignition, 1.0, Some(EventSource::Stage(1))));
        q.push(FlightEvent::new(FlightEventKind::Burnout, 5.0, Some(EventSource::Stage(0))));
        let moved = q.split_off(|e| e.source_stage() == Some(0));
        assert_eq!(q.len(), 1);
        let mut moved = moved;
        assert_eq!(moved.pop().map(|e| e.kind), Some(FlightEventKind::Apogee));
        assert_eq!(moved.pop().map(|e| e.kind), Some(FlightEventKind::Burnout));
    }

    #[test]
    fn apogee_crossing() {
        assert!(apogee_crossed(&make_state(5000.0, 10.0), &make_state(5005.0, -1.0)));
        assert!(!apogee_crossed(&make_state(5000.0, -1.0), &make_state(4990.0, -2.0)));
    }

    #[test]
    fn descending_crossing() {
        assert!(descended_through(&make_state(310.0, -5.0), &make_state(299.0, -5.0), 300.0));
        assert!(!descended_through(&make_state(290.0, 5.0), &make_state(310.0, 5.0), 300.0));
        assert!(ground_reached(&make_state(-0.1, -3.0)));
        assert!(!ground_reached(&make_state(0.0, 0.0)));
    }
}
