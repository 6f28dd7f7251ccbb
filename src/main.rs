//! luavm - run precompiled Lua 5.3 chunks
//!
//! This is the entry point of the `luavm` runner.

use std::error::Error;
use std::process;

use tracing_subscriber::EnvFilter;

use luavm::chunk::{listing, undump};
use luavm::config::{parse_cli_args, parse_config_file, print_help, VmConfig};
use luavm::{open_base, LuaState};

fn main() {
    if let Err(e) = run() {
        eprintln!("luavm: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = parse_cli_args(std::env::args().skip(1))?;

    if args.help {
        print_help();
        return Ok(());
    }
    if args.version {
        println!("luavm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => parse_config_file(path)?,
        None => VmConfig::default(),
    };
    args.apply(&mut config);

    let default_filter = if config.trace_instructions { "luavm=trace" } else { "luavm=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = args.chunk else {
        print_help();
        return Err("no chunk given".into());
    };
    let data = std::fs::read(&path)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;

    if args.list {
        print!("{}", listing(&undump(&data)?));
        if args.list_only {
            return Ok(());
        }
    }

    let mut state = LuaState::with_config(config);
    open_base(&mut state)?;
    state.load(&data, &path.to_string_lossy())?;

    let status = state.pcall(0, 0);
    if !status.is_ok() {
        let err = state.pop_value()?;
        return Err(format!("{:?}: {}", status, err).into());
    }
    Ok(())
}
