//! Output types of the expectation gate

use beaconcheck_core_types::Platform;
use serde::{Deserialize, Serialize};

pub const NO_RULES_PARAMETER: &str = "No validation rules";
pub const NO_RULES_DETAIL: &str = "No validation rules defined for this step.";

/// Pass/fail outcome for one declared parameter of one step/platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub step: String,
    pub platform: Platform,
    pub parameter: String,
    /// Expected value as written in the rules
    pub expected: String,
    /// Observed values joined with `" | "`
    pub actual: String,
    pub passed: bool,
    /// Set on the single record produced for a step without rules
    #[serde(default)]
    pub informational: bool,
}

impl Verdict {
    pub fn pass(step: &str, platform: Platform, parameter: &str, expected: String, actual: String) -> Self {
        Self {
            step: step.to_string(),
            platform,
            parameter: parameter.to_string(),
            expected,
            actual,
            passed: true,
            informational: false,
        }
    }

    pub fn fail(step: &str, platform: Platform, parameter: &str, expected: String, actual: String) -> Self {
        Self {
            passed: false,
            ..Self::pass(step, platform, parameter, expected, actual)
        }
    }

    pub fn no_rules(step: &str, platform: Platform) -> Self {
        Self {
            informational: true,
            ..Self::pass(
                step,
                platform,
                NO_RULES_PARAMETER,
                String::new(),
                NO_RULES_DETAIL.to_string(),
            )
        }
    }

    /// `"<step> [<PLATFORM>]"`, the label failures are reported under
    pub fn origin(&self) -> String {
        format!("{} [{}]", self.step, self.platform.label())
    }
}

/// One parameter row of the display matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub parameter: String,
    /// One cell per hit; `None` when the hit lacks the parameter
    pub values: Vec<Option<String>>,
    pub expected: Option<String>,
    pub passed: bool,
}

/// Parameter-by-hit view of one step/platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitMatrix {
    pub hit_labels: Vec<String>,
    pub rows: Vec<MatrixRow>,
}

impl HitMatrix {
    pub fn hit_count(&self) -> usize {
        self.hit_labels.len()
    }
}

/// Matrix, verdicts and summary status of one platform within a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformValidation {
    pub platform: Platform,
    pub matrix: HitMatrix,
    pub verdicts: Vec<Verdict>,
    pub passed: bool,
}

impl PlatformValidation {
    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }
}
