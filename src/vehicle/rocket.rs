use std::collections::BTreeMap;

use super::motor::MotorConfiguration;
use super::stage::Stage;

// ---------------------------------------------------------------------------
// Rocket: ordered stages plus selectable motor configurations
// ---------------------------------------------------------------------------

/// The rocket model consumed by the engine.
///
/// Stage 0 is the bottom booster that fires first; the highest index carries
/// the nose. Every mutating accessor bumps [`Rocket::revision`], which callers
/// compare against the revision of the last simulated snapshot.
#[derive(Debug, Clone)]
pub struct Rocket {
    name: String,
    stages: Vec<Stage>,
    motor_configurations: BTreeMap<String, MotorConfiguration>,
    default_configuration: Option<String>,
    revision: u64,
}

impl Rocket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: vec![],
            motor_configurations: BTreeMap::new(),
            default_configuration: None,
            revision: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, idx: usize) -> Option<&Stage> {
        self.stages.get(idx)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Mutable access to the stage list; counts as a structural change.
    pub fn stages_mut(&mut self) -> &mut Vec<Stage> {
        self.revision += 1;
        &mut self.stages
    }

    pub fn add_stage(&mut self, stage: Stage) {
        self.revision += 1;
        self.stages.push(stage);
    }

    /// Register a motor configuration. The first one registered becomes the default.
    pub fn add_motor_configuration(&mut self, id: impl Into<String>, config: MotorConfiguration) {
        let id = id.into();
        self.revision += 1;
        if self.default_configuration.is_none() {
            self.default_configuration = Some(id.clone());
        }
        self.motor_configurations.insert(id, config);
    }

    pub fn motor_configuration(&self, id: &str) -> Option<&MotorConfiguration> {
        self.motor_configurations.get(id)
    }

    pub fn motor_configuration_ids(&self) -> impl Iterator<Item = &str> {
        self.motor_configurations.keys().map(String::as_str)
    }

    pub fn default_motor_configuration(&self) -> Option<&str> {
        self.default_configuration.as_deref()
    }

    pub fn set_default_motor_configuration(&mut self, id: impl Into<String>) {
        self.revision += 1;
        self.default_configuration = Some(id.into());
    }

    /// Largest body diameter over all stages, m.
    pub fn reference_diameter(&self) -> f64 {
        self.stages.iter().map(Stage::max_diameter).fold(0.0, f64::max)
    }

    /// Configuration name if set, otherwise the motor designations from the
    /// top stage down, e.g. `[C6-5; D12-0]`.
    pub fn motor_configuration_description(&self, id: &str) -> Option<String> {
        let config = self.motor_configurations.get(id)?;
        if let Some(name) = &config.name {
            return Some(name.clone());
        }
        let motors: Vec<&str> = config
            .mounts
            .iter()
            .rev()
            .map(|(_, mount)| mount.motor.designation.as_str())
            .collect();
        Some(format!("[{}]", motors.join("; ")))
    }

    /// Check geometry, masses and the motors of configuration `id`.
    pub fn validate(&self, id: &str) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err(format!("rocket {} has no stages", self.name));
        }
        for stage in &self.stages {
            stage.validate()?;
        }
        if let Some(config) = self.motor_configurations.get(id) {
            for (&idx, mount) in &config.mounts {
                if idx >= self.stages.len() {
                    return Err(format!("motor {} mounted in missing stage {}", mount.motor.designation, idx));
                }
                if mount.ignition_delay < 0.0 {
                    return Err(format!("motor {} has a negative ignition delay", mount.motor.designation));
                }
                mount.motor.validate()?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rocket builder
// ---------------------------------------------------------------------------

pub struct RocketBuilder {
    rocket: Rocket,
}

impl RocketBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { rocket: Rocket::new(name) }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.rocket.add_stage(stage);
        self
    }

    pub fn motor_configuration(mut self, id: impl Into<String>, config: MotorConfiguration) -> Self {
        self.rocket.add_motor_configuration(id, config);
        self
    }

    pub fn build(self) -> Rocket {
        self.rocket
    }
}

// ---------------------------------------------------------------------------
// Preset rockets
// ---------------------------------------------------------------------------

pub mod presets {
    use super::*;
    use crate::vehicle::component::{DeployTrigger, FinSet, NoseShape, RecoveryDevice};
    use crate::vehicle::motor::Motor;
    use crate::vehicle::stage::{SeparationTrigger, StageBuilder};

    /// 29 mm motor, 60 N for 1.9 s tapering to zero at 2.0 s.
    pub fn f60_motor() -> Motor {
        Motor {
            designation: "F60".into(),
            diameter: 0.029,
            length: 0.12,
            thrust_curve: vec![(0.0, 60.0), (1.9, 60.0), (2.0, 0.0)],
            propellant_mass: 0.07,
            casing_mass: 0.05,
            ejection_delay: None,
        }
    }

    fn sustainer_stage(recovery: Option<RecoveryDevice>) -> Stage {
        let mut builder = StageBuilder::new("Sustainer")
            .nose(0.15, 0.05, NoseShape::Ogive)
            .tube(0.6, 0.05)
            .fins(FinSet {
                count: 3,
                root_chord: 0.08,
                tip_chord: 0.04,
                span: 0.05,
                sweep: 0.03,
                thickness: 0.003,
                position: 0.67,
            })
            .dry_mass(0.35)
            .dry_cg(0.40);
        if let Some(device) = recovery {
            builder = builder.recovery(device);
        }
        builder.build()
    }

    /// Single-stage 50 mm sounding rocket on an F60, parachute one second after apogee.
    pub fn sounding_rocket() -> Rocket {
        let mut chute = RecoveryDevice::parachute("Main", 0.45, DeployTrigger::Apogee);
        chute.delay = 1.0;
        RocketBuilder::new("Sounding rocket")
            .stage(sustainer_stage(Some(chute)))
            .motor_configuration("F60", MotorConfiguration::new().with_motor(0, f60_motor(), 0.0))
            .build()
    }

    /// Same airframe with no recovery device.
    pub fn ballistic_rocket() -> Rocket {
        RocketBuilder::new("Ballistic rocket")
            .stage(sustainer_stage(None))
            .motor_configuration("F60", MotorConfiguration::new().with_motor(0, f60_motor(), 0.0))
            .build()
    }

    /// Two stages, F60 in each; separation at booster burnout, sustainer lights 0.5 s later.
    pub fn two_stage() -> Rocket {
        let booster = StageBuilder::new("Booster")
            .tube(0.3, 0.05)
            .fins(FinSet {
                count: 4,
                root_chord: 0.09,
                tip_chord: 0.04,
                span: 0.06,
                sweep: 0.04,
                thickness: 0.003,
                position: 0.21,
            })
            .recovery(RecoveryDevice::parachute("Booster chute", 0.3, DeployTrigger::Apogee))
            .dry_mass(0.2)
            .separation(SeparationTrigger::at_burnout(0.0))
            .build();
        let chute = RecoveryDevice::parachute("Main", 0.45, DeployTrigger::Altitude(300.0));
        RocketBuilder::new("Two-stage")
            .stage(booster)
            .stage(sustainer_stage(Some(chute)))
            .motor_configuration(
                "F60-F60",
                MotorConfiguration::new()
                    .with_motor(0, f60_motor(), 0.0)
                    .with_motor(1, f60_motor(), 0.5),
            )
            .build()
    }
}
