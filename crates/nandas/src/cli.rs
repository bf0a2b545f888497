//! Command-line parsing and the assemble-and-write driver.

use std::fs;
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, ValueEnum};
use nand_asm::assembler::{Assembler, Assembly};
use nand_asm::encoder::write_bits;
use nand_asm::listing::LISTING_HEADER;
use tracing::level_filters::LevelFilter;

/// Maximum number of distinct labels in one program.
pub const LABEL_CAP: usize = 1024;
/// The whole 16-bit address space.
pub const IMAGE_CAP: usize = nand_asm::ADDRESS_SPACE as usize;
/// Stack of the assembler thread. Both passes move the slot table, one slot
/// per image byte, by value.
const ASSEMBLER_STACK: usize = 64 * 1024 * 1024;

pub type HostAssembly = Assembly<LABEL_CAP, IMAGE_CAP>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Flat binary, one byte per instruction
    Bin,
    /// One line of eight `0`/`1` characters per instruction
    Bits,
}

#[derive(Parser, Debug)]
#[command(
    name = "nandas",
    version,
    about = "Assembler for the NAND stack machine"
)]
pub struct Cli {
    /// Assembly source file
    #[arg(default_value = "firmware.asm")]
    pub input: PathBuf,

    /// Image file to write
    #[arg(default_value = "firmware.bin")]
    pub output: PathBuf,

    /// Output encoding
    #[arg(short, long, value_enum, default_value_t = Format::Bin)]
    pub format: Format,

    /// Print the address listing to stdout
    #[arg(short, long)]
    pub listing: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log level used when `RUST_LOG` is not set.
    pub fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

pub fn run(cli: &Cli) -> Result<()> {
    let input = cli.input.display();
    tracing::debug!("reading {input}");
    let source =
        fs::read_to_string(&cli.input).with_context(|| format!("cannot read {input}"))?;

    let assembly = assemble(&source).map_err(|err| anyhow!("{input}: {err}"))?;
    tracing::debug!(
        "assembled {} lines into {} bytes",
        source.lines().count(),
        assembly.len()
    );
    for symbol in assembly.symbols().iter() {
        tracing::debug!(
            "label {} = {} (line {})",
            symbol.name(),
            symbol.address(),
            symbol.line()
        );
    }
    for entry in assembly.listing() {
        tracing::trace!("{entry}");
    }

    if cli.listing {
        println!("{LISTING_HEADER}");
        for entry in assembly.listing() {
            println!("{entry}");
        }
    }

    let bytes = render(&assembly, cli.format).with_context(|| format!("cannot encode {input}"))?;
    let output = cli.output.display();
    fs::write(&cli.output, &bytes).with_context(|| format!("cannot write {output}"))?;
    tracing::debug!("wrote {} bytes to {output}", bytes.len());
    Ok(())
}

pub fn assemble(source: &str) -> Result<Box<HostAssembly>> {
    thread::scope(|scope| -> Result<Box<HostAssembly>> {
        thread::Builder::new()
            .name("assembler".into())
            .stack_size(ASSEMBLER_STACK)
            .spawn_scoped(scope, || {
                Assembler::<LABEL_CAP, IMAGE_CAP>::new()
                    .assemble_source(source)
                    .map(Box::new)
                    .map_err(|err| anyhow!("{err}"))
            })
            .context("cannot start the assembler thread")?
            .join()
            .map_err(|_| anyhow!("assembler thread panicked"))?
    })
}

/// Encodes `assembly` into the bytes of the chosen output file.
pub fn render(assembly: &HostAssembly, format: Format) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; assembly.len()];
    let image = assembly
        .encode(&mut buffer)
        .map_err(|err| anyhow!("{err}"))?;
    match format {
        Format::Bin => Ok(image.as_bytes().to_vec()),
        Format::Bits => {
            let mut text = String::with_capacity(image.len() * 9);
            write_bits(image.as_bytes(), &mut text)?;
            Ok(text.into_bytes())
        }
    }
}
