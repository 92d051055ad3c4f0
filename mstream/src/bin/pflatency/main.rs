//! Page-fault latency probe (`pflatency`)

// Modules
mod args;

// Imports
use {
	self::args::Args,
	anyhow::Context,
	clap::{error::ErrorKind, Parser},
	mstream::{mapping, probe, LocalGroup, ProbeConfig},
	mstream_util::logger,
	std::{io, process},
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = match Args::try_parse() {
		Ok(args) => args,
		Err(err) => match err.kind() {
			ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
			_ => {
				eprintln!("{err}");
				process::exit(-1);
			},
		},
	};
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	let config = ProbeConfig {
		size:      args.size,
		backend:   args.backend,
		num_alloc: args.num_alloc,
		folder:    args.folder,
		seg_size:  args.seg_size.unwrap_or_else(mapping::page_size),
	};
	config.validate().context("Invalid probe config")?;
	tracing::debug!(?config, "Running probe");

	LocalGroup::launch(args.ranks as usize, |group| {
		probe::run(group, &config, args.verify, &mut io::stdout())
	})
	.context("Unable to run probe")?;

	Ok(())
}
