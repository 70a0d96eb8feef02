use anyhow::{Context as AnyhowContext, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub const LOG_FILE_ENV: &str = "COGNISYNC_LOG_FILE";

/// Copies every record to stderr and to an append-only log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize `env_logger` on stderr (stdout carries JSON output), honoring
/// `RUST_LOG` unless `--quiet` / `--verbose` override it.
pub fn init(verbose: bool, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} - {} - {} - {}",
                        buf.timestamp_millis(),
                        record.target(),
                        record.level(),
                        record.args()
                    )
                })
                .write_style(env_logger::WriteStyle::Never)
                .target(env_logger::Target::Pipe(Box::new(Tee { file })));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    builder
        .try_init()
        .context("logger already initialized")?;
    Ok(())
}
