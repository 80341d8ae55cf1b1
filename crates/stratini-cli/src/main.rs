use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stratini::loader::{self, OutdatednessChecker, RegenChoice, RegenOptions};
use stratini::{ConfigCache, ConfigFile, Endianness};

#[derive(Parser)]
#[command(name = "stratini")]
#[command(about = "Inspect, merge and coalesce layered ini configuration files")]
#[command(version)]
struct Cli {
    /// Game name substituted for %GAME% in ini values
    #[arg(long, global = true, default_value = "")]
    game: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a single ini file as parsed, without resolving BasedOn
    Dump {
        /// The ini file to read
        file: PathBuf,
    },

    /// Resolve a file's BasedOn chain and print the merged result
    Merge {
        /// The most-derived ini file of the chain
        file: PathBuf,
    },

    /// Pack every ini file in a directory into Coalesced.ini
    Coalesce {
        /// Directory to scan for ini files
        config_dir: PathBuf,

        /// Write the archive big-endian
        #[arg(long)]
        big_endian: bool,

        /// Ini file whose [ConfigCoalesceFilter] section lists files to skip
        #[arg(long)]
        filter: Option<PathBuf>,
    },

    /// Regenerate a baked ini if its defaults have changed, then print it
    Check {
        /// The default (template) ini at the bottom of the chain
        default_ini: PathBuf,

        /// The generated ini to check and refresh
        generated_ini: PathBuf,

        /// Regenerate unconditionally
        #[arg(long)]
        regen: bool,

        /// Never prompt; regenerate stale files silently
        #[arg(long)]
        unattended: bool,
    },
}

/// Asks on stderr so output stays pipeable; y/n answer one file,
/// a/s answer every remaining file this run.
fn prompt_on_stdin(path: &Path) -> RegenChoice {
    loop {
        eprint!(
            "'{}' is out of date, regenerate it? (y/n/a=yes to all/s=no to all) ",
            path.display()
        );
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
            return RegenChoice::No;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" => return RegenChoice::Yes,
            "n" => return RegenChoice::No,
            "a" => return RegenChoice::YesToAll,
            "s" => return RegenChoice::NoToAll,
            _ => continue,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stratini=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump { file } => {
            let mut config = ConfigFile::with_game(&cli.game);
            config.combine(&file);
            print!("{config}");
            Ok(())
        }
        Commands::Merge { file } => {
            let mut config = ConfigFile::with_game(&cli.game);
            loader::load_ini_hierarchy(&file, &mut config, false, &cli.game)
                .with_context(|| format!("failed to merge '{}'", file.display()))?;
            print!("{config}");
            Ok(())
        }
        Commands::Coalesce {
            config_dir,
            big_endian,
            filter,
        } => {
            let endianness = if big_endian {
                Endianness::Big
            } else {
                Endianness::Little
            };
            let mut cache = ConfigCache::new(&cli.game);
            cache
                .coalesce_files_from_disk(&config_dir, endianness, filter.as_deref())
                .with_context(|| {
                    format!("failed to coalesce '{}'", config_dir.display())
                })?;
            Ok(())
        }
        Commands::Check {
            default_ini,
            generated_ini,
            regen,
            unattended,
        } => {
            let mut cache = ConfigCache::new(&cli.game);
            let mut checker = OutdatednessChecker::new(RegenOptions {
                force_regenerate: regen,
                unattended,
            });
            checker
                .check(
                    &mut cache,
                    &default_ini,
                    &generated_ini,
                    &mut prompt_on_stdin,
                )
                .with_context(|| {
                    format!("failed to check '{}'", generated_ini.display())
                })?;
            if let Some(file) = cache.find_existing(&generated_ini) {
                print!("{file}");
            }
            Ok(())
        }
    }
}
