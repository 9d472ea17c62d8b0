use std::f64::consts::PI;

use crate::math::pow2;

// ---------------------------------------------------------------------------
// Body components (stacked fore to aft inside a stage)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoseShape {
    Conical,
    Ogive,
    Parabolic,
    Ellipsoid,
}

impl NoseShape {
    /// Barrowman centre-of-pressure location as a fraction of nose length.
    pub fn cp_fraction(self) -> f64 {
        match self {
            NoseShape::Conical => 2.0 / 3.0,
            NoseShape::Ogive => 0.466,
            NoseShape::Parabolic => 0.5,
            NoseShape::Ellipsoid => 1.0 / 3.0,
        }
    }

    /// Wetted area relative to a cone of the same length and base.
    fn wetted_factor(self) -> f64 {
        match self {
            NoseShape::Conical => 1.0,
            NoseShape::Ogive => 1.12,
            NoseShape::Parabolic => 1.1,
            NoseShape::Ellipsoid => 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyComponent {
    NoseCone { length: f64, diameter: f64, shape: NoseShape },
    BodyTube { length: f64, diameter: f64 },
    Transition { length: f64, fore_diameter: f64, aft_diameter: f64 },
}

impl BodyComponent {
    pub fn length(&self) -> f64 {
        match *self {
            BodyComponent::NoseCone { length, .. }
            | BodyComponent::BodyTube { length, .. }
            | BodyComponent::Transition { length, .. } => length,
        }
    }

    pub fn fore_diameter(&self) -> f64 {
        match *self {
            BodyComponent::NoseCone { .. } => 0.0,
            BodyComponent::BodyTube { diameter, .. } => diameter,
            BodyComponent::Transition { fore_diameter, .. } => fore_diameter,
        }
    }

    pub fn aft_diameter(&self) -> f64 {
        match *self {
            BodyComponent::NoseCone { diameter, .. } | BodyComponent::BodyTube { diameter, .. } => {
                diameter
            }
            BodyComponent::Transition { aft_diameter, .. } => aft_diameter,
        }
    }

    pub fn max_diameter(&self) -> f64 {
        self.fore_diameter().max(self.aft_diameter())
    }

    /// Surface area exposed to the airflow, m².
    pub fn wetted_area(&self) -> f64 {
        let frustum = |l: f64, d1: f64, d2: f64| {
            let (r1, r2) = (d1 / 2.0, d2 / 2.0);
            PI * (r1 + r2) * (pow2(l) + pow2(r2 - r1)).sqrt()
        };
        match *self {
            BodyComponent::NoseCone { length, diameter, shape } => {
                frustum(length, 0.0, diameter) * shape.wetted_factor()
            }
            BodyComponent::BodyTube { length, diameter } => PI * diameter * length,
            BodyComponent::Transition { length, fore_diameter, aft_diameter } => {
                frustum(length, fore_diameter, aft_diameter)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fin set (trapezoidal planform)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FinSet {
    pub count: u32,
    pub root_chord: f64, // m
    pub tip_chord: f64,  // m
    pub span: f64,       // m, root to tip
    pub sweep: f64,      // m, leading-edge setback of the tip
    pub thickness: f64,  // m
    pub position: f64,   // m, stage fore end to root leading edge
}

impl FinSet {
    pub fn planform_area(&self) -> f64 {
        0.5 * (self.root_chord + self.tip_chord) * self.span
    }

    /// Length of the mid-chord line from root to tip.
    pub fn mid_chord_span(&self) -> f64 {
        let dx = self.sweep + self.tip_chord / 2.0 - self.root_chord / 2.0;
        (pow2(self.span) + pow2(dx)).sqrt()
    }

    pub fn mean_aerodynamic_chord(&self) -> f64 {
        let (cr, ct) = (self.root_chord, self.tip_chord);
        if cr + ct <= 0.0 {
            return 0.0;
        }
        2.0 / 3.0 * (cr + ct - cr * ct / (cr + ct))
    }
}

// ---------------------------------------------------------------------------
// Recovery devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeployTrigger {
    /// At launch, plus the delay.
    Launch,
    /// At the motor's ejection charge.
    Ejection,
    Apogee,
    /// When descending through the given height above the launch site, m.
    Altitude(f64),
    Never,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryDevice {
    pub name: String,
    pub cd: f64,
    pub area: f64, // m^2
    pub trigger: DeployTrigger,
    pub delay: f64, // s
}

impl RecoveryDevice {
    pub fn parachute(name: impl Into<String>, diameter: f64, trigger: DeployTrigger) -> Self {
        Self {
            name: name.into(),
            cd: 0.8,
            area: PI * pow2(diameter / 2.0),
            trigger,
            delay: 0.0,
        }
    }

    pub fn drag_area(&self) -> f64 {
        self.cd * self.area
    }
}
