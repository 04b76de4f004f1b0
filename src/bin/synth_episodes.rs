use acs_records::{synthetic_columns, write_csv, CodeParser, Config, SynthOptions};
use clap::Parser;
use qu::ick_use::*;
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, io, path::PathBuf};

/// Generate a synthetic episode extract from the configured taxonomies.
#[derive(Parser)]
struct Opt {
    /// Run configuration (used for the taxonomy file paths)
    #[clap(short, long, default_value = "data/config.toml")]
    config: PathBuf,
    /// Number of patients to generate
    #[clap(short, long, default_value_t = 10)]
    patients: usize,
    /// Seed for reproducible output
    #[clap(long)]
    seed: Option<u64>,
    #[clap(short, long, default_value = "synthetic_episodes.csv")]
    output: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let parser = CodeParser::from_files(
        &config.parser.diagnoses.file,
        &config.parser.procedures.file,
    )?;
    let mut rng = match opt.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let options = SynthOptions {
        patients: opt.patients,
        ..SynthOptions::default()
    };
    let columns = synthetic_columns(&parser, &options, &mut rng);
    let num_rows = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
    let output = fs::File::create(&opt.output)
        .with_context(|| format!("creating \"{}\"", opt.output.display()))?;
    write_csv(&columns, io::BufWriter::new(output))?;
    event!(
        Level::INFO,
        "wrote {} synthetic episode rows to \"{}\"",
        num_rows,
        opt.output.display()
    );
    Ok(())
}
