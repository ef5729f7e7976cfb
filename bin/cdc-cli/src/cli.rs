// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cdc-cli")]
#[command(about = "Operational surface for the CDC sync engine", long_about = None)]
#[command(version)]
pub struct Cli {
	/// Path to the sync configuration file
	#[arg(short = 'c', long, env = "CDC_CONFIG_PATH", default_value = "cdc.toml", global = true)]
	pub config: PathBuf,

	/// Log level passed to the tracing env filter (e.g. "info", "cdc_engine=debug")
	#[arg(long, env = "CDC_LOG_LEVEL", default_value = "info", global = true)]
	pub log_level: String,

	/// Write logs to this file instead of stderr
	#[arg(long, env = "CDC_LOG_FILE", global = true)]
	pub log_file: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	/// Write a starter configuration template to `path`
	Init {
		path: PathBuf,
	},
	/// Parse the configuration and confirm every target is reachable
	Validate,
	/// Run the sync engine
	Sync {
		#[arg(long, value_enum, default_value = "full")]
		mode: SyncMode,
		/// Restrict this run to these source tables (comma-separated);
		/// defaults to every table in the configured mappings
		#[arg(long, value_delimiter = ',')]
		tables: Option<Vec<String>>,
	},
	/// Report backlog size and per-target lag/errors
	Status,
	/// Drop a table's initial-sync checkpoint so the next backfill restarts it from scratch
	Reset {
		#[arg(long)]
		table: String,
	},
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SyncMode {
	/// Run the baseline backfill only, then exit
	Initial,
	/// Skip the backfill and stream incremental changes only
	Incremental,
	/// Run any pending backfill, then stream incremental changes until interrupted
	Full,
}
