//! `mtag`: compiles an information-flow policy, binds its tags onto a
//! 64-bit RISC-V ELF image, and emits the two artifacts the tag-aware
//! substrate consumes: `policy.mtag` (LCA matrix, perimeter guards,
//! bindings) and `tags.mtag` (a verbatim copy of the input image).

use anyhow::Context;
use clap::Parser;
use policy::Policy;
use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;

mod emit;

const POLICY_OUTPUT_FILE: &str = "policy.mtag";
const TAGS_OUTPUT_FILE: &str = "tags.mtag";

#[derive(Parser)]
#[command(
    name = "mtag",
    about = "Compile an information-flow policy and stamp tag indices onto a RISC-V ELF image"
)]
struct Cli {
    /// Compiled 64-bit RISC-V ELF image.
    elf_file: PathBuf,
    /// Tag file binding program symbols to policy tags.
    tag_file: PathBuf,
    /// Policy file declaring topologies and perimeter guards.
    policy_file: PathBuf,
    /// Print the compiled topologies before emitting the artifacts.
    #[arg(long)]
    print_policy: bool,
}

fn main() {
    // The downstream driver probes with no arguments and expects a usage
    // line and a zero exit.
    let positional = env::args().skip(1).filter(|a| !a.starts_with('-')).count();
    if positional < 3 {
        println!("Missing arguments!");
        println!("Usage: mtag <elf-file> <tag-file> <policy-file>");
        return;
    }

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let policy = Policy::load(&cli.policy_file)
        .with_context(|| format!("failed to compile '{}'", cli.policy_file.display()))?;
    if cli.print_policy {
        print_policy(&policy);
    }

    let elf = elfimage::ElfImage::open(&cli.elf_file)?;

    let spec = tagspec::load(&cli.tag_file, &policy)
        .with_context(|| format!("failed to load '{}'", cli.tag_file.display()))?;
    for unknown in &spec.unknown_tags {
        eprintln!(
            "warning: line {}: tag '{}' is not in the specified policy",
            unknown.line, unknown.tag
        );
    }

    let bound = emit::bind_entries(&policy, &elf, &spec.entries);
    for symbol in &bound.missing_symbols {
        eprintln!("warning: couldn't locate symbol '{symbol}' in the ELF file");
    }

    let out = File::create(POLICY_OUTPUT_FILE)
        .with_context(|| format!("failed to create {POLICY_OUTPUT_FILE}"))?;
    let mut out = BufWriter::new(out);
    policy.dump(&mut out)?;
    emit::write_bindings(&mut out, &bound.bindings)?;
    out.flush()?;

    // The downstream tool wants the artifact and the binary tied together:
    // tags.mtag is the image, byte for byte.
    fs::write(TAGS_OUTPUT_FILE, elf.bytes())
        .with_context(|| format!("failed to write {TAGS_OUTPUT_FILE}"))?;

    Ok(())
}

/// Debug dump of every compiled topology and the master, one adjacency row
/// per vertex.
fn print_policy(policy: &Policy) {
    for topology in policy.topologies() {
        print_topology(topology);
    }
    print_topology(policy.topology());
}

fn print_topology(topology: &policy::topology::BasicTopology) {
    println!("Topology: '{}'", topology.name());
    for (index, name) in topology.vertex_names().iter().enumerate() {
        let row: Vec<String> = topology.matrix()[index]
            .iter()
            .map(|cell| cell.to_string())
            .collect();
        println!("\t'{}', {}: {}", name, index, row.join(" "));
    }
}
