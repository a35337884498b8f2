//! # Pipeline Phases
//!
//! A coercion may run at any of the six named pipeline steps. The phase set
//! is a closed enum rather than validated strings, so an unknown phase is
//! unrepresentable.

use std::fmt;

/// A named pipeline step at which coercions may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Before anything else touches the raw input.
    Parse,
    /// After the required/default/nullable checks.
    ValidateDefinition,
    /// The dedicated type-shaping slot between definition and children.
    CoerceType,
    /// After child models ran and were coalesced back.
    ValidateChildren,
    /// After enum membership was resolved.
    ValidateEnum,
    /// After the value validations ran.
    ValidateValue,
}

impl Phase {
    /// Every phase, in pipeline order.
    pub const ALL: [Phase; 6] = [
        Phase::Parse,
        Phase::ValidateDefinition,
        Phase::CoerceType,
        Phase::ValidateChildren,
        Phase::ValidateEnum,
        Phase::ValidateValue,
    ];

    /// Stable wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Parse => "parse",
            Phase::ValidateDefinition => "validate-definition",
            Phase::CoerceType => "coerce-type",
            Phase::ValidateChildren => "validate-children",
            Phase::ValidateEnum => "validate-enum",
            Phase::ValidateValue => "validate-value",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
