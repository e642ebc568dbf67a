use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedUnitError {
    pub unit: String,
}

impl UnsupportedUnitError {
    fn new<S: ToString>(unit: S) -> Self {
        Self {
            unit: unit.to_string(),
        }
    }
}

impl Display for UnsupportedUnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unsupported target unit '{}' (supported units: DU)",
            self.unit
        )
    }
}

impl std::error::Error for UnsupportedUnitError {}

/// The column unit the output field is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetUnit {
    DobsonUnits,
}

impl TargetUnit {
    pub fn long_name(&self) -> &'static str {
        match self {
            Self::DobsonUnits => "Dobson Units",
        }
    }
}

impl FromStr for TargetUnit {
    type Err = UnsupportedUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "du" => Ok(Self::DobsonUnits),
            _ => Err(UnsupportedUnitError::new(s)),
        }
    }
}

impl Display for TargetUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DobsonUnits => write!(f, "DU"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_unit() {
        assert_eq!("DU".parse::<TargetUnit>().unwrap(), TargetUnit::DobsonUnits);
        assert_eq!("du".parse::<TargetUnit>().unwrap(), TargetUnit::DobsonUnits);

        let err = "ppm".parse::<TargetUnit>().unwrap_err();
        assert_eq!(err.unit, "ppm");
    }

    #[test]
    fn test_display_round_trips() {
        let unit = TargetUnit::DobsonUnits;
        assert_eq!(unit.to_string().parse::<TargetUnit>().unwrap(), unit);
        assert_eq!(unit.long_name(), "Dobson Units");
    }
}
