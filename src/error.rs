use serde::{Deserialize, Serialize};

/// Why a per-cell quantity could not be computed.
///
/// These are outcomes, not failures: a single undefined cell never aborts
/// a field computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Undefined {
    /// The cell is masked out of the grid or its input value is missing.
    Masked,
    /// Fewer non-missing observations than the configured minimum.
    InsufficientData,
    /// Zero or unmeasurable spatial gradient.
    UndefinedGradient,
    /// The trend/gradient ratio is not a finite number.
    UndefinedVelocity,
    /// No cell satisfies every climate tolerance within the geographic tolerance.
    NoAnalogueFound,
}

impl Undefined {
    pub fn as_str(self) -> &'static str {
        match self {
            Undefined::Masked => "masked",
            Undefined::InsufficientData => "insufficient_data",
            Undefined::UndefinedGradient => "undefined_gradient",
            Undefined::UndefinedVelocity => "undefined_velocity",
            Undefined::NoAnalogueFound => "no_analogue_found",
        }
    }
}

impl std::fmt::Display for Undefined {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cell result type shared by every field in the engine.
pub type CellResult<T> = Result<T, Undefined>;

/// Errors reported upfront, before any per-cell work begins.
#[derive(Debug, Clone, PartialEq)]
pub enum VoccError {
    /// One or more configuration values are invalid. Messages are newline-joined.
    Config(String),
    /// A field or series does not match the grid it is used with.
    Shape {
        what: String,
        expected: usize,
        got: usize,
    },
    UnknownVariable(String),
    /// A requested time period contains no time steps.
    EmptyPeriod { start: f64, end: f64 },
}

impl std::fmt::Display for VoccError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoccError::Config(msg) => write!(f, "Invalid configuration:\n{}", msg),
            VoccError::Shape {
                what,
                expected,
                got,
            } => write!(
                f,
                "Shape mismatch for {}: expected {} values, got {}",
                what, expected, got
            ),
            VoccError::UnknownVariable(name) => write!(f, "Unknown variable '{}'", name),
            VoccError::EmptyPeriod { start, end } => {
                write!(f, "Period {}..={} contains no time steps", start, end)
            }
        }
    }
}

impl std::error::Error for VoccError {}

impl VoccError {
    /// Build a `Config` error from collected messages, or `Ok` if there are none.
    pub fn from_messages(errors: Vec<String>) -> Result<(), VoccError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(VoccError::Config(errors.join("\n")))
        }
    }

    pub fn check_len(what: &str, expected: usize, got: usize) -> Result<(), VoccError> {
        if expected == got {
            Ok(())
        } else {
            Err(VoccError::Shape {
                what: what.to_string(),
                expected,
                got,
            })
        }
    }
}
