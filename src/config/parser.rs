//! Configuration file parser
//!
//! Reads `key value` lines into a [`VmConfig`]. Blank lines and lines
//! starting with `#` are skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use super::VmConfig;

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid line format
    #[error("Invalid line format at line {0}: {1}")]
    Format(usize, String),

    /// Invalid parameter value
    #[error("Invalid value for parameter '{0}' at line {1}: {2}")]
    Value(String, usize, String),

    /// Unknown parameter
    #[error("Unknown parameter '{0}' at line {1}")]
    UnknownParam(String, usize),
}

/// Parse a configuration file
pub fn parse_config_file(path: &Path) -> Result<VmConfig, ConfigParseError> {
    let file = File::open(path)?;
    parse_lines(BufReader::new(file))
}

/// Parse configuration text
pub fn parse_config_str(text: &str) -> Result<VmConfig, ConfigParseError> {
    parse_lines(text.as_bytes())
}

fn parse_lines<R: BufRead>(reader: R) -> Result<VmConfig, ConfigParseError> {
    let mut config = VmConfig::default();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.splitn(2, ' ').collect();
        if parts.len() != 2 {
            return Err(ConfigParseError::Format(line_num + 1, line.to_string()));
        }

        let param = parts[0].trim().to_lowercase();
        let value = parts[1].trim();

        apply_config_param(&mut config, &param, value, line_num + 1)?;
    }

    Ok(config)
}

/// Apply a configuration parameter to the config
fn apply_config_param(config: &mut VmConfig, param: &str, value: &str, line_num: usize) -> Result<(), ConfigParseError> {
    match param {
        "max-call-depth" => {
            config.max_call_depth = parse_value(param, value, line_num)?;
        }
        "max-stack-size" => {
            config.max_stack_size = parse_value(param, value, line_num)?;
        }
        "min-stack" => {
            config.min_stack = parse_value(param, value, line_num)?;
        }
        "trace-instructions" => {
            config.trace_instructions = parse_yes_no(param, value, line_num)?;
        }
        "cache-chunks" => {
            config.cache_chunks = parse_yes_no(param, value, line_num)?;
        }
        "chunk-cache-size" => {
            config.chunk_cache_size = parse_value(param, value, line_num)?;
        }
        _ => return Err(ConfigParseError::UnknownParam(param.to_string(), line_num)),
    }

    Ok(())
}

/// Parse a value that implements FromStr
fn parse_value<T: FromStr>(param: &str, value: &str, line_num: usize) -> Result<T, ConfigParseError> {
    value.parse::<T>()
        .map_err(|_| ConfigParseError::Value(param.to_string(), line_num, value.to_string()))
}

/// Parse a yes/no value
fn parse_yes_no(param: &str, value: &str, line_num: usize) -> Result<bool, ConfigParseError> {
    match value.to_lowercase().as_str() {
        "yes" | "1" => Ok(true),
        "no" | "0" => Ok(false),
        _ => Err(ConfigParseError::Value(param.to_string(), line_num, value.to_string())),
    }
}
