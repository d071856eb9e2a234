use clap::{Parser, Subcommand};
use packprompt::exclude::ExcludeSet;
use packprompt::{codec, pack};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "packprompt",
    about = "Pack a directory tree of text files into one prompt-safe artifact, and back",
    after_help = "Binary files are skipped by heuristic (NUL byte / content signature / \
                  non-text ratio). File modes are stored and restored on unpack."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serialize a directory tree into a single text file
    Pack {
        /// Root directory to walk
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Output prompt file
        #[arg(long, default_value = "files-prompt.txt")]
        out: PathBuf,
        /// Comma-separated glob patterns; replaces the built-in excludes
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Recreate a directory tree from a packed file
    Unpack {
        /// Input prompt file
        #[arg(long = "in", default_value = "files-prompt.txt")]
        input: PathBuf,
        /// Destination directory
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Pack { root, out, exclude } => {
            let excludes = match exclude {
                Some(csv) => ExcludeSet::from_csv(&csv),
                None => ExcludeSet::defaults(),
            };
            let mut writer = BufWriter::new(File::create(&out)?);
            let summary = pack::pack_tree(&root, &excludes, &mut writer)?;
            writer.flush()?;
            println!("Packed {} file(s) to {}", summary.packed, out.display());
        }
        Commands::Unpack { input, dest } => {
            fs::create_dir_all(&dest)?;
            let reader = BufReader::new(File::open(&input)?);
            let count = codec::decode_stream(reader, &dest)?;
            println!("Unpacked {} file(s) into {}", count, dest.display());
        }
    }
    Ok(())
}
