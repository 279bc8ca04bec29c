//! soload command line.
//!
//! - `soload deps <file>` prints a module's `DT_NEEDED` entries
//! - `soload unpack --config <toml>` brings every unpack directory up to date
//! - `soload load <name> --config <toml>` loads a module and prints the load order

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use soload::{DlopenPrimitive, Loader, LoaderConfig, ModuleName, TracingObserver};
use soload_deps::elf;
use soload_unpack::{EnsureOutcome, Unpacker};

/// soload command line arguments.
#[derive(Parser, Debug)]
#[command(name = "soload")]
#[command(about = "Dependency-ordered native module loader")]
struct Args {
	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the DT_NEEDED entries of a shared object
	Deps {
		/// Shared object to inspect
		file: PathBuf,
	},
	/// Extract the deps manifest and every split named in the config
	Unpack {
		#[arg(short, long, value_name = "PATH")]
		config: PathBuf,
	},
	/// Load a module and its dependencies into this process
	Load {
		/// Module file name (`libfoo.so`) or short name (`foo`)
		name: String,

		#[arg(short, long, value_name = "PATH")]
		config: PathBuf,
	},
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	match args.command {
		Command::Deps { file } => deps(&file),
		Command::Unpack { config } => unpack(&config),
		Command::Load { name, config } => load(&name, &config, args.verbose),
	}
}

fn deps(file: &Path) -> anyhow::Result<()> {
	let mut reader = BufReader::new(File::open(file).with_context(|| format!("opening {}", file.display()))?);
	let isa = elf::read_isa(&mut reader).with_context(|| format!("reading {}", file.display()))?;
	let needed = elf::read_needed(&mut reader).with_context(|| format!("reading {}", file.display()))?;

	tracing::debug!(file = %file.display(), %isa, count = needed.len(), "read descriptor");
	for module in needed {
		println!("{module}");
	}
	Ok(())
}

fn loader(config: &Path) -> anyhow::Result<Loader> {
	let config = LoaderConfig::load(config)?;
	let loader = Loader::from_config(&config, Arc::new(DlopenPrimitive::new()))?;
	Ok(loader)
}

fn unpack(config: &Path) -> anyhow::Result<()> {
	let loader = loader(config)?;
	let unpackers = loader
		.catalog()
		.map(|catalog| catalog.unpacker())
		.into_iter()
		.chain(loader.sources().splits().map(|split| split.unpacker()));

	for unpacker in unpackers {
		report(unpacker, unpacker.ensure_available())?;
	}
	Ok(())
}

fn report(unpacker: &Unpacker, outcome: soload_unpack::Result<EnsureOutcome>) -> anyhow::Result<()> {
	let outcome = outcome.with_context(|| format!("unpacking {}", unpacker.archive().describe()))?;
	let verb = match outcome {
		EnsureOutcome::AlreadyCurrent => "current",
		EnsureOutcome::Extracted => "extracted",
	};
	println!("{verb}\t{}", unpacker.dir().display());
	Ok(())
}

fn load(name: &str, config: &Path, verbose: bool) -> anyhow::Result<()> {
	let loader = loader(config)?;
	if verbose {
		loader.observers().add(Arc::new(TracingObserver));
	}

	let module = if name.contains('.') || name.contains('/') {
		ModuleName::new(name)
	} else {
		ModuleName::from_short(name)
	};
	let loaded = loader.load_module(module)?;

	if loaded.retried {
		tracing::info!(module = %loaded.module, "loaded after recovery");
	}
	for module in &loaded.loaded {
		println!("{module}");
	}
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = EnvFilter::try_from_env("SOLOAD_LOG").unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("soload=trace,soload_unpack=debug,soload_deps=debug,info")
		} else {
			EnvFilter::new("info")
		}
	});

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true))
		.init();
}
