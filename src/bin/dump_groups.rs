use acs_records::CodeTree;
use clap::Parser;
use qu::ick_use::*;
use std::{fs, path::PathBuf};

/// List the codes of each group declared by a taxonomy file.
#[derive(Parser)]
struct Opt {
    /// Taxonomy YAML file (e.g. data/icd10_demo.yaml)
    codes_file: PathBuf,
    /// Only print this group
    #[clap(short, long)]
    group: Option<String>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let file = fs::File::open(&opt.codes_file)
        .with_context(|| format!("opening \"{}\"", opt.codes_file.display()))?;
    let tree = CodeTree::from_reader(file)?;
    let groups: Vec<&String> = match &opt.group {
        Some(group) => vec![group],
        None => tree.groups().iter().collect(),
    };
    for group in groups {
        println!("{}:", group);
        for (name, docs) in tree.codes_in_group(group)? {
            println!("  {} - {}", name, docs);
        }
    }
    Ok(())
}
