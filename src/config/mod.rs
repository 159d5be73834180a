//! Lowering configuration.
//!
//! Loaded from a small TOML file:
//!
//! ```toml
//! [target]
//! word_width = 64
//!
//! [lowering]
//! parallel = false
//! optimize_jump_slots = true
//! ```

#[cfg(test)]
mod tests;

use std::path::Path;

use crate::diagnostic::Diagnostic;
use crate::tcg::TcgWidth;

/// Settings shared by every lowering pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoweringConfig {
    /// Native word width of the guest; width of every TCG variable.
    pub word_width: TcgWidth,
    /// Run each phase across instructions on the rayon pool.
    pub parallel: bool,
    /// Reserve `goto_tb` slot 1 for the first static exit.
    pub optimize_jump_slots: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            word_width: TcgWidth::I64,
            parallel: false,
            optimize_jump_slots: true,
        }
    }
}

impl LoweringConfig {
    pub fn with_word_width(mut self, word_width: TcgWidth) -> Self {
        self.word_width = word_width;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, Diagnostic> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::config(format!(
                "cannot read lowering config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self, Diagnostic> {
        let err = |msg: String| Diagnostic::config(format!("{}: {}", path.display(), msg));
        let parse_bool = |key: &str, value: &str| match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(err(format!("invalid {}: {}", key, value))),
        };

        let mut config = Self::default();
        let mut section = String::new();

        for (lineno, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(err(format!("line {}: expected `key = value`", lineno + 1)));
            };
            let key = key.trim();
            let value = value.split('#').next().unwrap_or("").trim();

            match (section.as_str(), key) {
                ("target", "word_width") => {
                    let bits: u32 = value
                        .parse()
                        .map_err(|_| err(format!("invalid target.word_width: {}", value)))?;
                    config.word_width = TcgWidth::from_bits(bits).ok_or_else(|| {
                        err(format!("target.word_width must be 32 or 64, got {}", bits))
                    })?;
                }
                ("lowering", "parallel") => {
                    config.parallel = parse_bool("lowering.parallel", value)?;
                }
                ("lowering", "optimize_jump_slots") => {
                    config.optimize_jump_slots = parse_bool("lowering.optimize_jump_slots", value)?;
                }
                _ => {
                    return Err(err(format!("unknown key '{}' in section [{}]", key, section)));
                }
            }
        }

        Ok(config)
    }
}
