// Copyright (c) 2026 CDC Sync Contributors
// This file is licensed under the Apache-2.0 license, see LICENSE file

mod init;
mod reset;
mod status;
mod sync;
mod validate;

use cdc_core::Result;

use crate::cli::{Cli, Command};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Command::Init { path } => init::run(&path),
		Command::Validate => validate::run(&cli.config).await,
		Command::Sync { mode, tables } => sync::run(&cli.config, mode, tables.as_deref()).await,
		Command::Status => status::run(&cli.config),
		Command::Reset { table } => reset::run(&cli.config, &table),
	}
}
