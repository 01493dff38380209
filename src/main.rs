use clap::Parser;
use cmf2imf::imf::{ImfType, ImfWriter};
use cmf2imf::{Error, Player};
use log::{info, warn};
use simplelog::TermLogger;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cmf2imf")]
#[command(version = "0.1.0")]
#[command(about = "Convert Creative Labs CMF music into id Software IMF", long_about = None)]
struct Args {
    /// Input CMF file
    input: PathBuf,

    /// Output IMF file
    output: PathBuf,

    /// IMF playback speed in Hertz (280, 560, 700)
    #[arg(short, long)]
    speed: u32,

    /// 0 or 1 to create a type-0 or type-1 IMF
    #[arg(short = 't', long = "type", default_value_t = 0)]
    imf_type: u8,

    /// Skip the fixed hihat/cymbal frequency presets written at startup
    #[arg(long)]
    no_rhythm_presets: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let imf_type = if args.imf_type == 1 {
        ImfType::Type1
    } else {
        ImfType::Type0
    };

    let data = std::fs::read(&args.input)?;
    let mut writer = ImfWriter::new(&args.output, imf_type, args.speed)?;

    let mut player = Player::new(&data)?;
    player.set_rhythm_presets(!args.no_rhythm_presets);
    player.init(&mut writer)?;

    loop {
        match player.tick(&mut writer) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e @ Error::CorruptStream { .. }) => {
                // Keep whatever converted cleanly up to this point
                warn!("{e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }

    writer.finalize()?;
    info!("wrote {}", args.output.display());
    Ok(())
}
