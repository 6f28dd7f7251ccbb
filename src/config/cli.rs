//! Command-line argument parser
//!
//! Parses the arguments of the `luavm` runner. Options override whatever the
//! configuration file sets.

use std::path::PathBuf;

use super::VmConfig;

/// Command-line arguments for the runner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// Configuration file path
    pub config: Option<PathBuf>,

    /// Binary chunk to run
    pub chunk: Option<PathBuf>,

    /// Print the prototype listing before running
    pub list: bool,

    /// Only print the listing
    pub list_only: bool,

    /// Trace every dispatched instruction
    pub trace: bool,

    /// Call depth limit override
    pub max_call_depth: Option<usize>,

    /// Disable the chunk cache
    pub no_cache: bool,

    pub help: bool,
    pub version: bool,
}

impl CliArgs {
    /// Apply the overrides given on the command line
    pub fn apply(&self, config: &mut VmConfig) {
        if self.trace {
            config.trace_instructions = true;
        }
        if let Some(depth) = self.max_call_depth {
            config.max_call_depth = depth;
        }
        if self.no_cache {
            config.cache_chunks = false;
        }
    }
}

/// Parse arguments, without the program name
pub fn parse_cli_args<I, S>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut cli_args = CliArgs::default();
    let mut args = args.into_iter().map(Into::into);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => cli_args.help = true,
            "--version" | "-v" => cli_args.version = true,
            "--config" | "-c" => {
                let path = args.next().ok_or("missing argument for --config")?;
                cli_args.config = Some(PathBuf::from(path));
            }
            "--max-call-depth" => {
                let depth = args.next().ok_or("missing argument for --max-call-depth")?;
                let depth = depth
                    .parse::<usize>()
                    .map_err(|_| format!("invalid call depth: {}", depth))?;
                cli_args.max_call_depth = Some(depth);
            }
            "--list" | "-l" => {
                // A second -l lists without running, like luac -p -l
                if cli_args.list {
                    cli_args.list_only = true;
                }
                cli_args.list = true;
            }
            "--trace" => cli_args.trace = true,
            "--no-cache" => cli_args.no_cache = true,
            other if other.starts_with('-') && other != "-" => {
                return Err(format!("unknown argument: {}", other));
            }
            path => {
                if cli_args.chunk.is_some() {
                    return Err(format!("unexpected argument: {}", path));
                }
                cli_args.chunk = Some(PathBuf::from(path));
            }
        }
    }

    Ok(cli_args)
}

/// Print help information
pub fn print_help() {
    println!("Usage: luavm [OPTIONS] <chunk.out>");
    println!("       luavm -l luac.out");
    println!("       luavm --config luavm.conf --trace luac.out");
    println!();
    println!("Options:");
    println!("  --help, -h                Show this help message");
    println!("  --version, -v             Show version information");
    println!("  --config, -c  <file>      Configuration file to use");
    println!("  --list, -l                Print the prototype listing (twice: listing only)");
    println!("  --trace                   Trace every instruction (RUST_LOG=luavm::vm=trace)");
    println!("  --max-call-depth <n>      Maximum nesting of calls (default: 200)");
    println!("  --no-cache                Do not cache decoded chunks");
}
