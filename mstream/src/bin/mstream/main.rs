//! Memory streaming benchmark (`mstream`)

// Modules
mod args;

// Imports
use {
	self::args::Args,
	anyhow::Context,
	clap::{error::ErrorKind, Parser},
	mstream::{bench, Config, LocalGroup, Tuning},
	mstream_util::logger,
	std::{fs, io, process},
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

	// Read the tuning, if any
	let mut tuning = match &args.tuning_file {
		Some(path) => Tuning::from_file(path).context("Unable to read tuning")?,
		None => Tuning::default(),
	};
	tuning.verify |= args.verify;

	let config = Config {
		alloc_size: args.alloc_size,
		seg_size:   args.seg_size,
		chunk_size: args.chunk_size,
		mode:       args.mode,
		backend:    args.backend,
		read_file:  args.read_file,
		policy:     args.policy,
		dynamic:    args.dynamic,
		folder:     args.folder,
	};
	tracing::debug!(?config, ?tuning, "Running benchmark");

	// Run the benchmark on all ranks
	let reports = LocalGroup::launch(args.ranks as usize, |group| {
		bench::run(group, &config, &tuning, &mut io::stdout())
	})
	.context("Unable to run benchmark")?;

	if let Some(output_path) = &args.output_file {
		let output_file = fs::File::create(output_path).context("Unable to create output file")?;
		serde_json::to_writer_pretty(output_file, &reports).context("Unable to write to output file")?;
	}

	Ok(())
}
