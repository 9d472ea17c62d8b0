use crate::math::pow2;

use super::component::{BodyComponent, FinSet, NoseShape, RecoveryDevice};

// ---------------------------------------------------------------------------
// Stage separation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationEvent {
    Launch,
    Burnout,
    Ejection,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationTrigger {
    pub event: SeparationEvent,
    pub delay: f64, // s
}

impl SeparationTrigger {
    pub fn at_burnout(delay: f64) -> Self {
        Self { event: SeparationEvent::Burnout, delay }
    }

    pub fn never() -> Self {
        Self { event: SeparationEvent::Never, delay: 0.0 }
    }
}

// ---------------------------------------------------------------------------
// Stage definition (one separable section of the rocket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub body: Vec<BodyComponent>,       // fore to aft
    pub fins: Vec<FinSet>,
    pub recovery: Vec<RecoveryDevice>,
    pub dry_mass: f64,                  // kg, without motor
    pub dry_cg: f64,                    // m, from the stage fore end
    pub longitudinal_inertia: f64,      // kg·m^2 about the dry CG
    pub rotational_inertia: f64,        // kg·m^2 about the axis
    pub separation: SeparationTrigger,
}

impl Stage {
    pub fn length(&self) -> f64 {
        self.body.iter().map(BodyComponent::length).sum()
    }

    pub fn max_diameter(&self) -> f64 {
        self.body
            .iter()
            .map(BodyComponent::max_diameter)
            .fold(0.0, f64::max)
    }

    pub fn aft_diameter(&self) -> f64 {
        self.body.last().map(BodyComponent::aft_diameter).unwrap_or(0.0)
    }

    /// Body radius at `x` metres from the stage fore end.
    pub fn radius_at(&self, x: f64) -> f64 {
        let mut start = 0.0;
        for c in &self.body {
            let end = start + c.length();
            if x <= end {
                let frac = if c.length() > 0.0 { (x - start) / c.length() } else { 1.0 };
                let frac = frac.clamp(0.0, 1.0);
                return 0.5 * (c.fore_diameter() + (c.aft_diameter() - c.fore_diameter()) * frac);
            }
            start = end;
        }
        self.aft_diameter() / 2.0
    }

    pub fn has_recovery(&self) -> bool {
        !self.recovery.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.body.is_empty() {
            return Err(format!("stage {} has no body components", self.name));
        }
        if self.body.iter().any(|c| !(c.length() > 0.0) || c.max_diameter() < 0.0) {
            return Err(format!("stage {} has a degenerate body component", self.name));
        }
        if !(self.dry_mass > 0.0) {
            return Err(format!("stage {} must have positive dry mass", self.name));
        }
        if self.fins.iter().any(|f| f.count == 0 || f.span < 0.0 || f.root_chord <= 0.0) {
            return Err(format!("stage {} has an invalid fin set", self.name));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stage builder
// ---------------------------------------------------------------------------

pub struct StageBuilder {
    name: String,
    body: Vec<BodyComponent>,
    fins: Vec<FinSet>,
    recovery: Vec<RecoveryDevice>,
    dry_mass: f64,
    dry_cg: Option<f64>,
    inertia: Option<(f64, f64)>,
    separation: SeparationTrigger,
}

impl StageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: vec![],
            fins: vec![],
            recovery: vec![],
            dry_mass: 0.5,
            dry_cg: None,
            inertia: None,
            separation: SeparationTrigger::never(),
        }
    }

    pub fn nose(mut self, length: f64, diameter: f64, shape: NoseShape) -> Self {
        self.body.push(BodyComponent::NoseCone { length, diameter, shape });
        self
    }

    pub fn tube(mut self, length: f64, diameter: f64) -> Self {
        self.body.push(BodyComponent::BodyTube { length, diameter });
        self
    }

    pub fn transition(mut self, length: f64, fore_diameter: f64, aft_diameter: f64) -> Self {
        self.body.push(BodyComponent::Transition { length, fore_diameter, aft_diameter });
        self
    }

    pub fn fins(mut self, fins: FinSet) -> Self { self.fins.push(fins); self }
    pub fn recovery(mut self, device: RecoveryDevice) -> Self { self.recovery.push(device); self }
    pub fn dry_mass(mut self, v: f64) -> Self { self.dry_mass = v; self }
    pub fn dry_cg(mut self, v: f64) -> Self { self.dry_cg = Some(v); self }
    pub fn inertia(mut self, longitudinal: f64, rotational: f64) -> Self { self.inertia = Some((longitudinal, rotational)); self }
    pub fn separation(mut self, v: SeparationTrigger) -> Self { self.separation = v; self }

    /// CG defaults to mid-length, inertia to a slender cylinder of the stage's size.
    pub fn build(self) -> Stage {
        let length: f64 = self.body.iter().map(BodyComponent::length).sum();
        let radius = self
            .body
            .iter()
            .map(BodyComponent::max_diameter)
            .fold(0.0, f64::max)
            / 2.0;
        let (longitudinal_inertia, rotational_inertia) = self.inertia.unwrap_or((
            self.dry_mass * (3.0 * pow2(radius) + pow2(length)) / 12.0,
            self.dry_mass * pow2(radius) / 2.0,
        ));
        Stage {
            name: self.name,
            body: self.body,
            fins: self.fins,
            recovery: self.recovery,
            dry_mass: self.dry_mass,
            dry_cg: self.dry_cg.unwrap_or(length / 2.0),
            longitudinal_inertia,
            rotational_inertia,
            separation: self.separation,
        }
    }
}
