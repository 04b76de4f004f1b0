use acs_records::{
    extract_records, CodeParser, Config, CsvRows, ExtractOptions, Metagroups, StringInterner,
};
use clap::Parser;
use qu::ick_use::*;
use std::io::Write;
use std::{fs, io, path::PathBuf};

#[derive(Parser)]
struct Opt {
    /// CSV episode extract, ordered by (nhs_number, spell_id, episode_start)
    episodes: PathBuf,
    /// Run configuration
    #[clap(short, long, default_value = "data/config.toml")]
    config: PathBuf,
    /// Where to write the feature table
    #[clap(short, long, default_value = "acs_records.csv")]
    output: PathBuf,
    /// Where to stream record documents when save_records is set
    #[clap(long, default_value = "records.yaml")]
    records: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load(&opt.config)?;
    let mut strings = StringInterner::new();
    let mut parser = CodeParser::from_files(
        &config.parser.diagnoses.file,
        &config.parser.procedures.file,
    )?;
    let groups = Metagroups::from_config(&config.code_groups, &mut strings);
    let options = ExtractOptions {
        window_seconds: config.window_seconds,
        cancel_interval: config.cancel_interval,
        ..ExtractOptions::default()
    };

    let mut records_file = if config.save_records {
        let file = fs::File::create(&opt.records)
            .with_context(|| format!("creating \"{}\"", opt.records.display()))?;
        let mut file = io::BufWriter::new(file);
        // Concatenated YAML documents, one per index record.
        writeln!(file, "# One document per ACS/PCI index record")?;
        Some(file)
    } else {
        None
    };

    let mut rows = CsvRows::from_path(&opt.episodes)?;
    let table = extract_records(
        &mut rows,
        &mut parser,
        &mut strings,
        &groups,
        &options,
        |record, strings| {
            if let Some(file) = records_file.as_mut() {
                let doc = record.to_doc(strings)?;
                writeln!(file, "---")?;
                file.write_all(serde_yaml::to_string(&doc)?.as_bytes())?;
            }
            Ok(())
        },
    )?;

    if let Some(mut file) = records_file {
        file.flush()?;
        event!(Level::INFO, "wrote records to \"{}\"", opt.records.display());
    }

    let output = fs::File::create(&opt.output)
        .with_context(|| format!("creating \"{}\"", opt.output.display()))?;
    table.to_csv(io::BufWriter::new(output))?;
    event!(
        Level::INFO,
        "wrote {} records to \"{}\"",
        table.len(),
        opt.output.display()
    );
    Ok(())
}
