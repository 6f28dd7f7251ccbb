//! Configuration module for the VM
//!
//! Limits and switches for a [`LuaState`](crate::lua::LuaState). They can be
//! built in code or read from a `key value` configuration file.

mod cli;
mod parser;

pub use cli::{parse_cli_args, print_help, CliArgs};
pub use parser::{parse_config_file, parse_config_str, ConfigParseError};

/// Default number of free slots guaranteed to every frame
pub const MIN_STACK: usize = 20;

/// Default upper bound on the slots of a single frame
pub const MAX_STACK_SIZE: usize = 1_000_000;

/// VM configuration
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Maximum nesting of calls before `CallDepthExceeded` is raised
    pub max_call_depth: usize,

    /// Maximum number of slots a single frame may grow to
    pub max_stack_size: usize,

    /// Free slots added above the registers of each new frame
    pub min_stack: usize,

    /// Emit a trace event for every dispatched instruction
    pub trace_instructions: bool,

    /// Share decoded prototypes between loads of identical chunks
    pub cache_chunks: bool,

    /// Number of decoded chunks the cache keeps before evicting the oldest
    pub chunk_cache_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 200,
            max_stack_size: MAX_STACK_SIZE,
            min_stack: MIN_STACK,
            trace_instructions: false,
            cache_chunks: true,
            chunk_cache_size: crate::chunk::DEFAULT_CHUNK_CACHE_SIZE,
        }
    }
}

impl VmConfig {
    /// Get a configuration parameter by name
    pub fn get(&self, param: &str) -> Option<String> {
        match param {
            "max-call-depth" => Some(self.max_call_depth.to_string()),
            "max-stack-size" => Some(self.max_stack_size.to_string()),
            "min-stack" => Some(self.min_stack.to_string()),
            "trace-instructions" => Some(yes_no(self.trace_instructions)),
            "cache-chunks" => Some(yes_no(self.cache_chunks)),
            "chunk-cache-size" => Some(self.chunk_cache_size.to_string()),
            _ => None,
        }
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}
