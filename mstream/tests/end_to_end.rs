//! End-to-end runs on an in-process group

// Imports
use {
	mstream::{bench, BackendKind, Config, EvictionPolicy, LocalGroup, Mode, RankReport, Tuning},
	std::{
		io,
		path::Path,
		sync::{Arc, Mutex},
	},
};

/// Output shared by all ranks
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
	fn lines(&self) -> Vec<String> {
		let bytes = self.0.lock().expect("Poisoned").clone();
		String::from_utf8(bytes)
			.expect("Output wasn't utf-8")
			.lines()
			.map(str::to_owned)
			.collect()
	}
}

impl io::Write for SharedBuf {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().expect("Poisoned").extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn config(folder: &Path, mode: Mode, backend: BackendKind) -> Config {
	Config {
		alloc_size: 1048576,
		seg_size: 65536,
		chunk_size: 4096,
		mode,
		backend,
		read_file: false,
		policy: EvictionPolicy::Fifo,
		dynamic: false,
		folder: folder.to_owned(),
	}
}

fn tuning(verify: bool) -> Tuning {
	Tuning {
		verify,
		..Tuning::default()
	}
}

fn run(ranks: usize, config: &Config, tuning: &Tuning) -> Result<(Vec<RankReport>, Vec<String>), anyhow::Error> {
	let out = SharedBuf::default();
	let reports = LocalGroup::launch(ranks, |group| bench::run(group, config, tuning, &mut out.clone()))?;
	Ok((reports, out.lines()))
}

/// Splits a report line into its `;`-separated fields
fn fields(line: &str) -> Vec<&str> {
	line.split(';').map(str::trim).collect()
}

#[test]
fn single_rank() {
	let tmp = tempfile::tempdir().expect("Unable to create temp dir");
	let config = self::config(tmp.path(), Mode::Sequential, BackendKind::Memory);
	let (reports, lines) = self::run(1, &config, &self::tuning(false)).expect("Run failed");

	assert_eq!(lines.len(), 1);
	let fields = self::fields(&lines[0]);
	assert_eq!(fields.len(), 17);
	assert_eq!(&fields[..10], [
		"0", "1", "1048576", "1048576", "65536", "4096", "0", "0", "0", "0"
	]);
	assert_eq!(&fields[15..], ["0", "0"]);
	assert!(lines[0].starts_with("0;1; 1048576;1048576;65536;4096;0;0;0;0; "));

	let report = &reports[0];
	assert_eq!(report.alloc_size, 1048576);
	assert_eq!(report.alloc_size_all, 1048576);
	assert!(report.compute_secs > 0.0);
	assert!(report.flush_secs <= report.compute_secs);
	assert!(report.compute_secs <= report.barrier_secs);

	// Bandwidth covers the ten measured passes
	let expected_bandwidth = 10.0 * 1048576.0 / report.compute_secs / 1048576.0;
	assert!((report.bandwidth_mib - expected_bandwidth).abs() <= 1e-6 * expected_bandwidth);

	assert!(!tmp.path().join("tmp").exists());
}

#[test]
fn four_ranks_report_in_order() {
	let tmp = tempfile::tempdir().expect("Unable to create temp dir");
	let config = self::config(tmp.path(), Mode::Sequential, BackendKind::Memory);
	let (reports, lines) = self::run(4, &config, &self::tuning(false)).expect("Run failed");

	assert_eq!(lines.len(), 4);
	for (rank, line) in lines.iter().enumerate() {
		let fields = self::fields(line);
		assert_eq!(fields[0], rank.to_string());
		assert_eq!(fields[1], "4");
		assert_eq!(fields[2], "1048576");
		assert_eq!(fields[3], "4194304");
	}

	for report in &reports {
		assert!(
			report.aggregate_bandwidth_mib <= 4.0 * report.bandwidth_mib * (1.0 + 1e-9),
			"{report:?}"
		);
	}
	assert!(!tmp.path().join("tmp").exists());
}

#[test]
fn every_backend_verifies() {
	let tmp = tempfile::tempdir().expect("Unable to create temp dir");
	for &backend in BackendKind::ALL {
		for mode in [Mode::PseudoRandom, Mode::Mixed] {
			let config = Config {
				alloc_size: 256 * 1024,
				..self::config(tmp.path(), mode, backend)
			};
			let tuning = Tuning {
				warmup_iters: 1,
				measured_iters: 2,
				max_resident_segments: Some(2),
				..self::tuning(true)
			};

			let (reports, lines) =
				self::run(2, &config, &tuning).unwrap_or_else(|err| panic!("{backend:?} {mode:?} failed: {err:?}"));
			assert_eq!(lines.len(), 2);
			assert_eq!(reports.len(), 2);

			match backend {
				BackendKind::Paging => assert!(reports.iter().all(|report| report.write_faults > 0)),
				_ => assert!(reports
					.iter()
					.all(|report| report.read_faults == 0 && report.write_faults == 0)),
			}

			// Verification keeps the files around
			let config_dir = tmp.path().join(format!("tmp/2_{mode}_{backend}_0_0"));
			assert!(config_dir.join("p0").is_dir(), "{config_dir:?}");
			assert!(config_dir.join("p1").is_dir(), "{config_dir:?}");
		}
	}
}

#[test]
fn dynamic_sizing() {
	let tmp = tempfile::tempdir().expect("Unable to create temp dir");
	let config = Config {
		dynamic: true,
		..self::config(tmp.path(), Mode::Padding, BackendKind::Mmap)
	};
	let tuning = Tuning {
		dynamic_base: 0,
		stagger_us: 1000,
		measured_iters: 2,
		..self::tuning(false)
	};
	let (reports, lines) = self::run(3, &config, &tuning).expect("Run failed");

	let alloc_sizes = reports.iter().map(|report| report.alloc_size).collect::<Vec<_>>();
	assert_eq!(alloc_sizes, [1048576, 524288, 262144]);
	for (report, line) in reports.iter().zip(&lines) {
		assert_eq!(report.alloc_size_all, 3 * report.alloc_size);
		assert_eq!(line, &report.to_string());
	}
}

#[test]
fn invalid_config_fails() {
	let tmp = tempfile::tempdir().expect("Unable to create temp dir");
	let config = Config {
		chunk_size: 2 * 1048576,
		..self::config(tmp.path(), Mode::Sequential, BackendKind::Memory)
	};
	assert!(self::run(2, &config, &self::tuning(false)).is_err());

	let config = self::config(tmp.path(), Mode::Sequential, BackendKind::Memory);
	let tuning = Tuning {
		measured_iters: 0,
		..self::tuning(false)
	};
	assert!(self::run(1, &config, &tuning).is_err());
}

#[test]
fn unusable_folder_aborts_all_ranks() {
	let tmp = tempfile::tempdir().expect("Unable to create temp dir");
	let file = tmp.path().join("not-a-dir");
	std::fs::write(&file, b"").expect("Unable to create file");

	let config = self::config(&file, Mode::Sequential, BackendKind::Mmap);
	let err = self::run(4, &config, &self::tuning(false)).expect_err("Run should fail");
	assert!(format!("{err:?}").contains("Rank 0 failed"), "{err:?}");
}
