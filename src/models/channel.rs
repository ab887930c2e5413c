use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

use super::telemetry::TelemetryKind;

/// Number of analog inputs on the controller.
pub const CHANNEL_COUNT: usize = 6;

/// What physical quantity a channel is wired to.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Channel is read but never published.
    None,
    Temperature,
    Pressure,
}

/// Represents errors found while validating channel configuration.
/// Any of these prevents sampling from starting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown channel kind '{0}'. Expected one of None, Temperature, Pressure.")]
    UnknownKind(String),

    #[error("Channel {channel} has no calibration coefficients.")]
    EmptyCoefficients { channel: usize },

    #[error("Channel {channel} has a non-finite calibration coefficient at position {position}.")]
    NonFiniteCoefficient { channel: usize, position: usize },

    #[error("Expected {} channels but {} were configured.", CHANNEL_COUNT, .0)]
    ChannelCount(usize),

    #[error("Polling cadence must be greater than zero.")]
    ZeroCadence,
}

impl FromStr for ChannelKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(ChannelKind::None),
            "Temperature" => Ok(ChannelKind::Temperature),
            "Pressure" => Ok(ChannelKind::Pressure),
            other => Err(ConfigurationError::UnknownKind(other.to_string())),
        }
    }
}

impl ChannelKind {
    /// The telemetry record this channel contributes to, if any.
    pub fn telemetry_kind(&self) -> Option<TelemetryKind> {
        match self {
            ChannelKind::None => None,
            ChannelKind::Temperature => Some(TelemetryKind::Temperature),
            ChannelKind::Pressure => Some(TelemetryKind::Pressure),
        }
    }
}

/// Calibration polynomial mapping volts to physical units.
/// Coefficients are stored highest degree first, so `[2, 1]` is `2v + 1`.
///
/// Polynomials can't be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Create a polynomial for `channel`. Returns an error if the coefficient
    /// list is empty or holds a NaN or infinity.
    pub fn new(channel: usize, coefficients: Vec<f64>) -> Result<Self, ConfigurationError> {
        if coefficients.is_empty() {
            return Err(ConfigurationError::EmptyCoefficients { channel });
        }
        if let Some(position) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(ConfigurationError::NonFiniteCoefficient { channel, position });
        }
        Ok(Self { coefficients })
    }

    /// Volts pass through unchanged.
    pub fn identity() -> Self {
        Self {
            coefficients: vec![1.0, 0.0],
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate at `x` using Horner's method.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .fold(0.0, |accumulator, coefficient| accumulator * x + coefficient)
    }
}

impl Default for Polynomial {
    fn default() -> Self {
        Self::identity()
    }
}

/// Validated configuration of a single analog input.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub kind: ChannelKind,
    pub polynomial: Polynomial,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kind: ChannelKind::None,
            polynomial: Polynomial::identity(),
        }
    }
}

impl ChannelConfig {
    /// Validate the raw kind name and coefficients for `channel`.
    pub fn parse(
        channel: usize,
        kind: &str,
        coefficients: &[f64],
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            kind: kind.parse()?,
            polynomial: Polynomial::new(channel, coefficients.to_vec())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_kinds() {
        assert_eq!("None".parse::<ChannelKind>(), Ok(ChannelKind::None));
        assert_eq!(
            "Temperature".parse::<ChannelKind>(),
            Ok(ChannelKind::Temperature)
        );
        assert_eq!("Pressure".parse::<ChannelKind>(), Ok(ChannelKind::Pressure));
    }

    #[test]
    fn test_reject_unknown_kind() {
        assert_eq!(
            "Humidity".parse::<ChannelKind>(),
            Err(ConfigurationError::UnknownKind("Humidity".into()))
        );
        // Kind names are case sensitive.
        assert!("pressure".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn test_cant_construct_empty_polynomial() {
        assert_eq!(
            Polynomial::new(3, vec![]),
            Err(ConfigurationError::EmptyCoefficients { channel: 3 })
        );
    }

    #[test]
    fn test_cant_construct_non_finite_polynomial() {
        assert_eq!(
            Polynomial::new(1, vec![1.0, f64::NAN]),
            Err(ConfigurationError::NonFiniteCoefficient {
                channel: 1,
                position: 1
            })
        );
        assert!(Polynomial::new(1, vec![f64::INFINITY]).is_err());
    }

    #[test]
    fn test_evaluate_descending_coefficients() {
        let identity = Polynomial::identity();
        assert_eq!(identity.evaluate(-10.0), -10.0);
        assert_eq!(identity.evaluate(3.5), 3.5);

        // 2x^2 - 3x + 1
        let quadratic = Polynomial::new(0, vec![2.0, -3.0, 1.0]).unwrap();
        assert_eq!(quadratic.evaluate(0.0), 1.0);
        assert_eq!(quadratic.evaluate(2.0), 3.0);
        assert_eq!(quadratic.evaluate(-1.0), 6.0);

        let constant = Polynomial::new(0, vec![42.0]).unwrap();
        assert_eq!(constant.evaluate(7.0), 42.0);
    }

    #[test]
    fn test_evaluate_linear_scale() {
        let polynomial = Polynomial::new(0, vec![344738.0, 0.0]).unwrap();
        assert_eq!(polynomial.evaluate(1.0), 344738.0);
        assert_eq!(polynomial.evaluate(-10.0), -3447380.0);
    }

    #[test]
    fn test_channel_config_parse() {
        let config = ChannelConfig::parse(2, "Temperature", &[0.5, 1.0]).unwrap();
        assert_eq!(config.kind, ChannelKind::Temperature);
        assert_eq!(config.polynomial.coefficients(), &[0.5, 1.0]);

        assert!(ChannelConfig::parse(2, "Voltage", &[1.0, 0.0]).is_err());
        assert!(ChannelConfig::parse(2, "Pressure", &[]).is_err());
    }

    #[test]
    fn test_default_channel_is_unused_identity() {
        let config = ChannelConfig::default();
        assert_eq!(config.kind, ChannelKind::None);
        assert_eq!(config.polynomial, Polynomial::identity());
    }
}
