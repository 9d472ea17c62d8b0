use crate::error::ModelError;
use crate::math::{pow2, EPSILON};
use crate::sim::status::FlightConfiguration;
use crate::sim::warning::{Warning, WarningKind, WarningSet};
use crate::vehicle::{BodyComponent, FinSet, Stage};

use super::{AeroConditions, AerodynamicCalculator, AerodynamicForces};

/// Angle of attack above which the linear normal-force model is unreliable.
pub const MAX_RELIABLE_AOA: f64 = 17.5 * std::f64::consts::PI / 180.0;

const LAMINAR_LIMIT: f64 = 5.0e5;
const MIN_REYNOLDS: f64 = 1.0e4;

// ---------------------------------------------------------------------------
// Barrowman component method
// ---------------------------------------------------------------------------

/// Normal force slope and centre of pressure of one component.
#[derive(Debug, Clone, Copy)]
struct Contribution {
    cn_alpha: f64,
    cp: f64, // m from the nose tip
}

/// Extended Barrowman method: body components and trapezoidal fins add
/// their normal-force slopes; drag is skin friction plus base drag.
#[derive(Debug, Clone, Default)]
pub struct BarrowmanCalculator;

impl BarrowmanCalculator {
    pub fn new() -> Self {
        Self
    }

    fn body_contribution(c: &BodyComponent, x: f64, d_ref: f64) -> Option<Contribution> {
        let (d1, d2) = (c.fore_diameter(), c.aft_diameter());
        let cn_alpha = 2.0 * (pow2(d2 / d_ref) - pow2(d1 / d_ref));
        if cn_alpha.abs() < EPSILON {
            return None;
        }
        let length = c.length();
        let cp = match *c {
            BodyComponent::NoseCone { shape, .. } => x + shape.cp_fraction() * length,
            _ => {
                let r = d1 / d2;
                x + length / 3.0 * (1.0 + (1.0 - r) / (1.0 - pow2(r)))
            }
        };
        Some(Contribution { cn_alpha, cp })
    }

    fn fin_contribution(fins: &FinSet, stage: &Stage, x_stage: f64, d_ref: f64, mach: f64) -> Contribution {
        let (cr, ct, s) = (fins.root_chord, fins.tip_chord, fins.span);
        let n = f64::from(fins.count);
        let r = stage.radius_at(fins.position);
        let interference = 1.0 + r / (s + r);
        let lf = fins.mid_chord_span();
        let cn_fins = 4.0 * n * pow2(s / d_ref) / (1.0 + (1.0 + pow2(2.0 * lf / (cr + ct))).sqrt());
        let beta = (1.0 - pow2(mach)).abs().sqrt().max(0.3);

        let x_le = x_stage + fins.position;
        let cp = x_le
            + fins.sweep * (cr + 2.0 * ct) / (3.0 * (cr + ct))
            + ((cr + ct) - cr * ct / (cr + ct)) / 6.0;
        Contribution { cn_alpha: interference * cn_fins / beta, cp }
    }

    /// Turbulent/laminar flat-plate friction coefficient with compressibility correction.
    fn skin_friction(reynolds: f64, mach: f64) -> f64 {
        let re = reynolds.max(MIN_REYNOLDS);
        let cf = if re < LAMINAR_LIMIT { 1.328 / re.sqrt() } else { 0.074 / re.powf(0.2) };
        if mach < 1.0 {
            cf * (1.0 - 0.1 * pow2(mach))
        } else {
            cf / (1.0 + 0.15 * pow2(mach)).powf(0.58)
        }
    }

    fn base_drag(mach: f64) -> f64 {
        if mach < 1.0 {
            0.12 + 0.13 * pow2(mach)
        } else {
            0.25 / mach
        }
    }
}

impl AerodynamicCalculator for BarrowmanCalculator {
    fn name(&self) -> &str {
        "barrowman"
    }

    fn forces(
        &self,
        configuration: &FlightConfiguration,
        conditions: &AeroConditions,
        warnings: &mut WarningSet,
    ) -> Result<AerodynamicForces, ModelError> {
        let ref_length = configuration.reference_length();
        let ref_area = configuration.reference_area();
        if !(ref_area > 0.0) {
            return Err(ModelError::Invalid("configuration has zero reference area".into()));
        }
        let mach = conditions.mach;
        let total_length = configuration.total_length();

        // Normal force
        let mut parts: Vec<Contribution> = Vec::new();
        let mut body_wetted = 0.0;
        let mut fin_friction_area = 0.0;
        for (idx, stage) in configuration.active_stages().rev() {
            let x_stage = configuration.stage_offset(idx);
            let mut x = x_stage;
            for component in &stage.body {
                parts.extend(Self::body_contribution(component, x, ref_length));
                body_wetted += component.wetted_area();
                x += component.length();
            }
            for fins in &stage.fins {
                parts.push(Self::fin_contribution(fins, stage, x_stage, ref_length, mach));
                let mac = fins.mean_aerodynamic_chord();
                let thickness = if mac > 0.0 { 1.0 + 2.0 * fins.thickness / mac } else { 1.0 };
                fin_friction_area += 2.0 * f64::from(fins.count) * fins.planform_area() * thickness;
            }
        }

        let cn_alpha: f64 = parts.iter().map(|p| p.cn_alpha).sum();
        let cp = if cn_alpha.abs() > EPSILON {
            parts.iter().map(|p| p.cn_alpha * p.cp).sum::<f64>() / cn_alpha
        } else {
            conditions.cg
        };
        let pitch_damping = if total_length > 0.0 {
            parts
                .iter()
                .map(|p| p.cn_alpha.abs() * pow2((p.cp - conditions.cg) / total_length))
                .sum()
        } else {
            0.0
        };

        // Drag
        let reynolds = conditions.airspeed * total_length / conditions.kinematic_viscosity.max(EPSILON);
        let cf = Self::skin_friction(reynolds, mach);
        let fineness = if ref_length > 0.0 { total_length / ref_length } else { 1.0 };
        let friction = cf * ((1.0 + 0.5 / fineness.max(1.0)) * body_wetted + fin_friction_area) / ref_area;
        let base = if conditions.thrusting {
            0.0
        } else {
            let aft = configuration
                .active_stages()
                .next()
                .map(|(_, s)| s.aft_diameter())
                .unwrap_or(0.0);
            Self::base_drag(mach) * pow2(aft / ref_length)
        };

        if conditions.aoa > MAX_RELIABLE_AOA && conditions.airspeed > 1.0 {
            warnings.add(Warning::new(
                WarningKind::LargeAngleOfAttack,
                format!("{:.1}°", conditions.aoa.to_degrees()),
            ));
        }
        if mach > 1.0 {
            warnings.add(Warning::new(WarningKind::Supersonic, format!("Mach {mach:.2}")));
        }

        let forces = AerodynamicForces {
            cn_alpha,
            cp,
            cn: cn_alpha * conditions.aoa.sin(),
            cd: friction + base,
            pitch_damping,
            ref_area,
            ref_length,
        };
        if ![forces.cn_alpha, forces.cp, forces.cd, forces.pitch_damping]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ModelError::Invalid("non-finite aerodynamic coefficients".into()));
        }
        Ok(forces)
    }
}
