//! qrseal CLI - password-protected secret text tokens
//!
//! Command-line interface for turning a short secret text into a printable
//! token (PBKDF2-HMAC-SHA256 + AES-256-GCM) and back.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use qrseal::config::{DEFAULT_ITERATIONS, DEFAULT_MAX_ITERATIONS, KdfParams};
use qrseal::engine::CryptoEngine;
use qrseal::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use qrseal::ops;
use qrseal::passphrase::{
    ConfirmingPassphraseReader, PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader,
};
use qrseal::token::TokenCodec;

#[derive(Parser)]
#[command(name = "qrseal")]
#[command(version)]
#[command(about = "Password-protected secret text tokens.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// PBKDF2 iterations for newly encrypted tokens
    #[arg(long, global = true, env = "QRSEAL_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,

    /// Refuse to decrypt tokens asking for more PBKDF2 iterations than this
    #[arg(long, global = true, env = "QRSEAL_MAX_ITERATIONS", default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: u32,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a text file into a token
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the token to (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Decrypt a token file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the file containing the token
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the recovered text to (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the record inside a token as JSON, without decrypting it
    #[command(alias = "x")]
    Inspect {
        /// Path to the file containing the token
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        report(&e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("qrseal={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let params = KdfParams::new(cli.iterations, cli.max_iterations)?;
    let engine = CryptoEngine::with_params(params);
    let codec = TokenCodec::with_max_iterations(params.max_iterations());

    match cli.command {
        Commands::Encrypt { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin, true);
            match output {
                Some(output) => ops::seal_file(&engine, &input, &output, &mut *reader),
                None => {
                    let plaintext = ops::read_text(&input)?;
                    let sealed = ops::seal_text(&engine, &mut *reader, &plaintext)?;
                    write_stdout(format!("{sealed}\n").as_bytes())
                }
            }
        }
        Commands::Decrypt { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin, false);
            match output {
                Some(output) => ops::open_file(&engine, &codec, &input, &output, &mut *reader),
                None => {
                    let sealed = ops::read_text(&input)?;
                    let plaintext = ops::open_token(&engine, &codec, &mut *reader, &sealed)?;
                    write_stdout(plaintext.as_bytes())
                }
            }
        }
        Commands::Inspect { input } => {
            let sealed = ops::read_text(&input)?;
            let json = ops::export_json(&codec, &sealed)?;
            write_stdout(format!("{json}\n").as_bytes())
        }
    }
}

fn get_passphrase_reader(use_stdin: bool, confirm: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(io::stdin())))
    } else if confirm {
        Box::new(ConfirmingPassphraseReader::terminal())
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(bytes)
        .and_then(|()| stdout.flush())
        .map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write to stdout",
                e,
            )
        })
}

/// Prints the error chain. The chain below a decryption failure names the
/// actual cause, so it is only shown in debug logs.
fn report(err: &QrsealError) {
    eprintln!("Error: {}", err);

    let mut source = err.source();
    while let Some(cause) = source {
        if err.is(ErrorKind::DecryptionFailed) {
            debug!(cause = %cause, "decryption failure detail");
        } else {
            eprintln!("  caused by: {}", cause);
        }
        source = cause.source();
    }
}
