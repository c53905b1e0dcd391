use std::path::PathBuf;

use dataflow::solvers::ForwardSolver;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("option {0} expects a value")]
    MissingValue(String),
    #[error("option {0} does not take a value")]
    UnexpectedValue(String),
    #[error("invalid value '{value}' for option {key}")]
    InvalidValue { key: String, value: String },
}

/// Checker level switches of the flow analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// Assume the analyzed program is single threaded. When off, only facts
    /// other code cannot invalidate are kept.
    pub sequential_semantics: bool,
    /// Continue after `assert c` with the knowledge that `c` holds.
    pub assume_asserts_enabled: bool,
    /// Treat every method call as side effect free.
    pub assume_side_effect_free: bool,
    pub block_visit_limit: Option<usize>,
    /// Write the annotated graph of every analyzed body to this directory.
    pub flow_dot_dir: Option<PathBuf>,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            sequential_semantics: true,
            assume_asserts_enabled: false,
            assume_side_effect_free: false,
            block_visit_limit: None,
            flow_dot_dir: None,
        }
    }
}

impl FlowOptions {
    /// Build the options from `key` or `key=value` strings, as passed to an
    /// annotation processor. A leading `-A` is accepted. Unknown keys are
    /// ignored, they may belong to the checker itself.
    pub fn from_options<'a, I>(options: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = Self::default();
        for option in options {
            let option = option.strip_prefix("-A").unwrap_or(option);
            let (key, value) = match option.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (option, None),
            };
            let flag = |value: Option<&str>| match value {
                None => Ok(true),
                Some(_) => Err(OptionsError::UnexpectedValue(key.to_owned())),
            };
            match key {
                "concurrentSemantics" => result.sequential_semantics = !flag(value)?,
                "assumeAssertsAreEnabled" => result.assume_asserts_enabled = flag(value)?,
                "assumeSideEffectFree" => result.assume_side_effect_free = flag(value)?,
                "flowVisitLimit" => {
                    let value = value.ok_or_else(|| OptionsError::MissingValue(key.to_owned()))?;
                    let limit = value.parse().map_err(|_| OptionsError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    })?;
                    result.block_visit_limit = Some(limit);
                }
                "flowdotdir" => {
                    let value = value.ok_or_else(|| OptionsError::MissingValue(key.to_owned()))?;
                    result.flow_dot_dir = Some(PathBuf::from(value));
                }
                _ => debug!(option, "ignoring unknown option"),
            }
        }
        Ok(result)
    }

    pub fn solver(&self) -> ForwardSolver {
        ForwardSolver {
            block_visit_limit: self.block_visit_limit,
        }
    }
}
