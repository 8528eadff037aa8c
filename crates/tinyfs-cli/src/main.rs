use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tinyfs_core::{
    BlockDevice, Config, FileBlockDevice, Geometry, MountOutcome, Session, BLOCK_SIZE,
    DEFAULT_IMAGE, TOTAL_BLOCKS,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the image file
    #[arg(short, long, default_value = DEFAULT_IMAGE)]
    image: PathBuf,

    /// Block size used when the image has to be formatted
    #[arg(long, default_value_t = BLOCK_SIZE)]
    block_size: u32,

    /// Block count used when the image has to be formatted
    #[arg(long, default_value_t = TOTAL_BLOCKS)]
    total_blocks: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a fresh image
    Format {
        /// Overwrite an image that already has content
        #[arg(short, long)]
        force: bool,
    },
    /// Create an empty file
    Create { name: String },
    /// Replace a file's content (reads stdin when no source is given)
    Write {
        name: String,

        /// Literal content
        #[arg(long, conflicts_with = "input")]
        data: Option<String>,

        /// Host file to copy in
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print a file's content to stdout
    Read { name: String },
    /// List files
    Ls,
    /// Show the superblock and block usage
    Info,
}

impl Cli {
    fn config(&self) -> Config {
        Config::new(self.image.clone()).with_geometry(Geometry::new(self.block_size, self.total_blocks))
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli.command {
        Commands::Format { force } => format(&config, force),
        Commands::Create { name } => with_session(&config, |fs| {
            let id = fs.create(&name)?;
            println!("Created {} (inode {})", name, id);
            Ok(())
        }),
        Commands::Write { name, data, input } => {
            let bytes = match (data, input) {
                (Some(data), _) => data.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => {
                    let mut buf = Vec::new();
                    io::stdin()
                        .read_to_end(&mut buf)
                        .context("failed to read stdin")?;
                    buf
                }
            };

            with_session(&config, |fs| {
                fs.write(&name, &bytes)?;
                println!("Wrote {} bytes to {}", bytes.len(), name);
                Ok(())
            })
        }
        Commands::Read { name } => with_session(&config, |fs| {
            let data = fs.read(&name)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
            Ok(())
        }),
        Commands::Ls => with_session(&config, |fs| {
            let files = fs.list()?;
            if files.is_empty() {
                println!("(no files)");
            }
            for file in files {
                println!("{:<32} {:>8} bytes  {} blocks", file.name, file.size, file.blocks.len());
            }
            Ok(())
        }),
        Commands::Info => with_session(&config, |fs| {
            let sb = fs.superblock()?;
            println!("Superblock: {:#?}", sb);
            println!(
                "Blocks in use: {} of {}",
                fs.bitmap()?.used_count(),
                sb.total_blocks
            );
            println!("Files: {}", fs.list()?.len());
            Ok(())
        }),
    }
}

fn format(config: &Config, force: bool) -> Result<()> {
    let device = open(config)?;
    if !device.is_empty()? && !force {
        bail!(
            "{} already has content; pass --force to overwrite it",
            config.image.display()
        );
    }

    let mut fs = Session::new(device, config.geometry);
    fs.format()
        .with_context(|| format!("failed to format {}", config.image.display()))?;
    println!("Superblock: {:#?}", fs.superblock()?);
    fs.close()?;

    println!("Format complete.");
    Ok(())
}

/// Opens the image, mounts it (formatting an empty one), runs `op` and closes.
fn with_session<F>(config: &Config, op: F) -> Result<()>
where
    F: FnOnce(&mut Session) -> tinyfs_core::Result<()>,
{
    let mut fs =
        Session::open(config).with_context(|| format!("failed to open {}", config.image.display()))?;
    let outcome = fs
        .mount_or_format()
        .with_context(|| format!("failed to mount {}", config.image.display()))?;
    if outcome == MountOutcome::Formatted {
        println!("Formatted new image {}", config.image.display());
    }
    debug!("{} is {:?}", config.image.display(), outcome);

    let result = op(&mut fs);
    fs.close()?;
    Ok(result?)
}

fn open(config: &Config) -> Result<FileBlockDevice> {
    FileBlockDevice::open(&config.image)
        .with_context(|| format!("failed to open {}", config.image.display()))
}
