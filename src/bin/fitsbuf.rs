use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fitsbuf::{
    FileConfig, FileDevice, FitsFile, HduDirectory, HduLayout, InsertAt, Mode, BLOCK_SIZE,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fitsbuf")]
#[command(about = "Inspect and restructure FITS files block by block")]
struct Cli {
    /// Path to the FITS file
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a range of bytes in hex
    Dump {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 80)]
        len: usize,
    },
    /// Rewrite the fill bytes after a unit's data
    Pad {
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Insert blocks into a unit
    Insert {
        #[command(flatten)]
        layout: LayoutArgs,
        #[arg(long)]
        blocks: u64,
        #[arg(long, value_enum, default_value = "data-end")]
        at: Place,
    },
    /// Delete blocks from the end of a unit's data
    Delete {
        #[command(flatten)]
        layout: LayoutArgs,
        #[arg(long)]
        blocks: u64,
    },
    /// Read random blocks and report buffer statistics
    Bench {
        #[arg(long, default_value_t = 10_000)]
        reads: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Place {
    HeaderEnd,
    FileStart,
    DataEnd,
}

impl From<Place> for InsertAt {
    fn from(place: Place) -> Self {
        match place {
            Place::HeaderEnd => InsertAt::HeaderEnd,
            Place::FileStart => InsertAt::FileStart,
            Place::DataEnd => InsertAt::DataEnd,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Image,
    Ascii,
}

/// Describes the unit an operation works on.
#[derive(Args)]
struct LayoutArgs {
    /// Header start of every unit followed by the end of the last one
    #[arg(long, value_delimiter = ',')]
    directory: Vec<u64>,
    /// Index of the unit in the directory
    #[arg(long, default_value_t = 0)]
    unit: usize,
    /// Data start of the unit, in bytes
    #[arg(long)]
    data_start: u64,
    /// Data bytes before the fill
    #[arg(long)]
    data_bytes: u64,
    #[arg(long, value_enum, default_value = "image")]
    kind: Kind,
}

impl LayoutArgs {
    fn apply(&self, file: &mut FitsFile<FileDevice>) -> fitsbuf::Result<()> {
        if !self.directory.is_empty() {
            file.set_directory(HduDirectory::new(self.directory.clone())?)?;
        }
        let header_start = file.hdu_directory().start(self.unit).unwrap_or(0);
        let layout = match self.kind {
            Kind::Image => HduLayout::image(header_start, self.data_start, self.data_bytes),
            Kind::Ascii => {
                HduLayout::ascii_table(header_start, self.data_start, self.data_bytes, 1, Vec::new())
            }
        };
        file.select_hdu(self.unit, layout)
    }
}

fn open(path: &Path, mode: Mode) -> Result<FitsFile<FileDevice>, Box<dyn Error>> {
    let device = FileDevice::open(path, mode)?;
    Ok(FitsFile::open(device, FileConfig::default().with_mode(mode))?)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Dump { offset, len } => {
            let mut file = open(&cli.file, Mode::ReadOnly)?;
            let available = file.logical_size().saturating_sub(offset);
            let mut bytes = vec![0u8; len.min(available as usize)];
            if !bytes.is_empty() {
                file.position(offset, true)?;
                file.read_bytes(&mut bytes)?;
            }
            for (line, chunk) in bytes.chunks(16).enumerate() {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                let text: String = chunk
                    .iter()
                    .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                    .collect();
                println!("{:08x}  {:<47}  {text}", offset + line as u64 * 16, hex.join(" "));
            }
        }
        Command::Pad { layout } => {
            let mut file = open(&cli.file, Mode::ReadWrite)?;
            layout.apply(&mut file)?;
            let repaired = file.repair_data_fill()?;
            file.close()?;
            println!("{}", if repaired { "fill rewritten" } else { "fill already correct" });
        }
        Command::Insert { layout, blocks, at } => {
            let mut file = open(&cli.file, Mode::ReadWrite)?;
            layout.apply(&mut file)?;
            file.insert_blocks(blocks, at.into())?;
            info!(directory = ?file.hdu_directory().as_slice(), "inserted blocks");
            file.close()?;
        }
        Command::Delete { layout, blocks } => {
            let mut file = open(&cli.file, Mode::ReadWrite)?;
            layout.apply(&mut file)?;
            file.delete_blocks(blocks)?;
            info!(directory = ?file.hdu_directory().as_slice(), "deleted blocks");
            file.close()?;
        }
        Command::Bench { reads, seed } => {
            let mut file = open(&cli.file, Mode::ReadOnly)?;
            let blocks = file.file_size() / BLOCK_SIZE as u64;
            if blocks == 0 {
                return Err("file holds no complete block".into());
            }
            let mut rng = StdRng::seed_from_u64(seed);
            let mut byte = [0u8; 1];
            let start = Instant::now();
            for _ in 0..reads {
                let block = rng.gen_range(0..blocks);
                let offset = rng.gen_range(0..BLOCK_SIZE as u64);
                file.position(block * BLOCK_SIZE as u64 + offset, true)?;
                file.read_bytes(&mut byte)?;
            }
            let elapsed = start.elapsed();
            let stats = file.stats();
            println!("reads:         {reads} over {blocks} blocks in {elapsed:?}");
            println!("hits:          {}", stats.hits);
            println!("misses:        {}", stats.misses);
            println!("device reads:  {}", stats.device_reads);
            println!("hit rate:      {:.1}%", stats.hit_rate());
        }
    }

    Ok(())
}
