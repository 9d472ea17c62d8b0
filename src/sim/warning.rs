use std::fmt;

/// Advisory conditions noticed during a run. None of them stop the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WarningKind {
    LargeAngleOfAttack,
    Supersonic,
    /// Recovery device opened at high airspeed, typically a late deployment.
    RecoveryHighSpeed,
    RecoveryWhileBurning,
    NoRecoveryDevice,
    UnstableAtLaunch,
    NoMotor,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WarningKind::LargeAngleOfAttack => "angle of attack exceeds the small-angle assumption",
            WarningKind::Supersonic => "supersonic flight, body aerodynamics are approximate",
            WarningKind::RecoveryHighSpeed => "recovery device deployed at high speed",
            WarningKind::RecoveryWhileBurning => "recovery device deployed while a motor is burning",
            WarningKind::NoRecoveryDevice => "no recovery device on the rocket",
            WarningKind::UnstableAtLaunch => "rocket is unstable at launch",
            WarningKind::NoMotor => "bottom stage has no motor",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub kind: WarningKind,
    pub detail: String,
}

impl Warning {
    pub fn new(kind: WarningKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} ({})", self.kind, self.detail)
        }
    }
}

/// Insertion-ordered warning set holding at most one warning per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarningSet {
    warnings: Vec<Warning>,
}

impl WarningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the kind was not present yet.
    pub fn add(&mut self, warning: Warning) -> bool {
        if self.contains(warning.kind) {
            return false;
        }
        self.warnings.push(warning);
        true
    }

    pub fn contains(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.iter()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Merge `other`, returning the warnings that were new to this set.
    pub fn absorb(&mut self, other: WarningSet) -> Vec<Warning> {
        other
            .warnings
            .into_iter()
            .filter(|w| self.add(w.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_by_kind() {
        let mut set = WarningSet::new();
        assert!(set.add(Warning::new(WarningKind::Supersonic, "M1.2")));
        assert!(!set.add(Warning::new(WarningKind::Supersonic, "M1.4")));
        assert!(set.add(Warning::new(WarningKind::NoMotor, "")));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().map(|w| w.detail.as_str()), Some("M1.2"));
    }

    #[test]
    fn absorb_reports_only_new() {
        let mut a = WarningSet::new();
        a.add(Warning::new(WarningKind::Supersonic, ""));
        let mut b = WarningSet::new();
        b.add(Warning::new(WarningKind::Supersonic, ""));
        b.add(Warning::new(WarningKind::LargeAngleOfAttack, "20°"));
        let fresh = a.absorb(b);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].kind, WarningKind::LargeAngleOfAttack);
        assert_eq!(a.len(), 2);
    }
}
