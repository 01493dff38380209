//! CMF to JSON converter

use clap::Parser;
use cmf2imf::cmf::{instrument, CmfHeader, CmfJson, CmfReader};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cmf2json")]
#[command(version = "0.1.0")]
#[command(about = "Dump CMF header, tags and instrument bank as JSON", long_about = None)]
struct Args {
    /// Input CMF file
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let data = std::fs::read(&args.input)?;

    let mut reader = CmfReader::new(&data);
    let header = CmfHeader::parse(&mut reader)?;
    reader.seek(usize::from(header.instrument_block_offset));
    let bank = instrument::load_bank(&mut reader, header.num_instruments)?;

    let cmf_json = CmfJson::new(&header, &data, &bank);

    let json_string = if args.compact {
        serde_json::to_string(&cmf_json)?
    } else {
        serde_json::to_string_pretty(&cmf_json)?
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json_string.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", json_string);
        }
    }

    Ok(())
}
