// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

mod cli;
mod commands;
mod logging;
mod template;

use cdc_core::Error;
use clap::Parser;
use cli::Cli;

const EXIT_OK: i32 = 0;
const EXIT_CONFIGURATION: i32 = 2;
const EXIT_REACHABILITY: i32 = 3;
const EXIT_RUNTIME: i32 = 4;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let _logging_guard = logging::init(&cli.log_level, cli.log_file.as_deref());

	match commands::dispatch(cli).await {
		Ok(()) => std::process::exit(EXIT_OK),
		Err(e) => {
			eprintln!("error: {e}");
			std::process::exit(exit_code_for(&e));
		}
	}
}

fn exit_code_for(err: &Error) -> i32 {
	match err {
		Error::Configuration(_) => EXIT_CONFIGURATION,
		Error::Reachability { .. } => EXIT_REACHABILITY,
		Error::Transient(_) | Error::Data(_) | Error::Capture(_) | Error::Other(_) => EXIT_RUNTIME,
	}
}
