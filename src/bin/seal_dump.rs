use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{LevelFilter, error};
use serde_json::json;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use seal_mkv::field_store::names;
use seal_mkv::{
    ByteRangeDirective, FieldStore, SealBackend, SealError, SealProcessor, SealStatus,
};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Copy, Clone, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

/// Verifier that only remembers what it was shown.
#[derive(Default)]
struct Collector {
    records: Vec<FieldStore>,
}

impl SealBackend for Collector {
    fn verify(&mut self, record: FieldStore, _buf: &[u8]) -> FieldStore {
        self.records.push(record.clone());
        record
    }

    fn sign(&mut self, _ctx: &FieldStore, _buf: &mut [u8]) -> seal_mkv::Result<()> {
        Err(SealError::Signing {
            message: "seal_dump does not sign files".to_string(),
        })
    }
}

struct SealDump {
    inputs: Vec<PathBuf>,
    output_format: OutputFormat,
    show_ranges: bool,
    verbosity_level: Option<LevelFilter>,
}

impl SealDump {
    fn from_cli_matches(matches: &ArgMatches) -> Self {
        let inputs = matches
            .get_many::<PathBuf>("INPUT")
            .map(|paths| paths.cloned().collect())
            .unwrap_or_default();

        let output_format = match matches
            .get_one::<String>("output-format")
            .map(String::as_str)
        {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        };

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(LevelFilter::Info),
            2 => Some(LevelFilter::Debug),
            3 => Some(LevelFilter::Trace),
            _ => {
                eprintln!("using more than -vvv does not affect verbosity level");
                Some(LevelFilter::Trace)
            }
        };

        SealDump {
            inputs,
            output_format,
            show_ranges: matches.get_flag("ranges"),
            verbosity_level,
        }
    }

    /// Dumps every input; returns false if any of them could not be processed.
    fn run(&self) -> bool {
        self.try_to_initialize_logging();

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut ok = true;

        for input in &self.inputs {
            if let Err(e) = self.dump_file(input, &mut out) {
                error!("{e:?}");
                eprintln!("{}: {e:#}", input.display());
                ok = false;
            }
        }
        ok
    }

    fn dump_file(&self, path: &Path, out: &mut impl Write) -> Result<()> {
        let buf =
            fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))?;

        let mut processor = SealProcessor::new(Collector::default());
        let report = processor
            .process(FieldStore::new(), &buf)
            .with_context(|| format!("failed to process `{}`", path.display()))?;
        let records = processor.into_backend().records;

        match self.output_format {
            OutputFormat::Text => self.write_text(path, report.status, &records, &buf, out)?,
            OutputFormat::Json => self.write_json(path, report.status, &records, &buf, out)?,
        }
        Ok(())
    }

    fn write_text(
        &self,
        path: &Path,
        status: SealStatus,
        records: &[FieldStore],
        buf: &[u8],
        out: &mut impl Write,
    ) -> Result<()> {
        writeln!(out, "File: {}", path.display())?;
        match status {
            SealStatus::NotRecognized => writeln!(out, "  not a Matroska file")?,
            SealStatus::NoSignatures if records.is_empty() => {
                writeln!(out, "  no SEAL records")?
            }
            _ => {}
        }

        for (i, record) in records.iter().enumerate() {
            writeln!(out, "Record {}", i + 1)?;
            for field in record.iter().filter(|f| !f.name().starts_with('@')) {
                writeln!(out, "  {} = {}", field.name(), field.text())?;
            }
            if let (Some(start), Some(end)) = (
                record.get_size(names::SIG_RANGE, 0),
                record.get_size(names::SIG_RANGE, 1),
            ) {
                writeln!(out, "  signature at {start}..{end}")?;
            }
            if self.show_ranges {
                match resolve_ranges(record, buf.len()) {
                    Ok(ranges) => {
                        for r in ranges {
                            writeln!(out, "  digest range {}..{}", r.0, r.1)?;
                        }
                    }
                    Err(e) => writeln!(out, "  digest range error: {e}")?,
                }
            }
        }
        Ok(())
    }

    fn write_json(
        &self,
        path: &Path,
        status: SealStatus,
        records: &[FieldStore],
        buf: &[u8],
        out: &mut impl Write,
    ) -> Result<()> {
        let status = match status {
            SealStatus::NotRecognized => "not_recognized",
            SealStatus::NoSignatures => "no_signatures",
            SealStatus::Signatures(_) => "signatures",
        };

        let records: Vec<_> = records
            .iter()
            .map(|record| {
                let mut value = json!({ "fields": record });
                if self.show_ranges {
                    value["ranges"] = match resolve_ranges(record, buf.len()) {
                        Ok(ranges) => json!(ranges),
                        Err(e) => json!({ "error": e.to_string() }),
                    };
                }
                value
            })
            .collect();

        let doc = json!({
            "file": path.display().to_string(),
            "status": status,
            "records": records,
        });
        serde_json::to_writer(&mut *out, &doc)?;
        writeln!(out)?;
        Ok(())
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = TermLogger::init(
                level,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {e:?}");
            }
        }
    }
}

fn resolve_ranges(record: &FieldStore, file_len: usize) -> seal_mkv::Result<Vec<(usize, usize)>> {
    let directive = record
        .get_text("b")
        .ok_or(SealError::MissingField { field: "b" })?;
    let directive: ByteRangeDirective = directive.parse()?;
    Ok(directive
        .resolve(record, file_len)?
        .into_iter()
        .map(|r| (r.start, r.end))
        .collect())
}

fn command() -> Command {
    Command::new("seal_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to list SEAL records embedded in Matroska/WebM files")
        .arg(
            Arg::new("INPUT")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf))
                .help("Files to inspect."),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("output-format")
                .value_parser(["text", "json"])
                .default_value("text")
                .help("Sets the output format. `json` prints one object per file."),
        )
        .arg(
            Arg::new("ranges")
                .long("ranges")
                .action(ArgAction::SetTrue)
                .help("Also print the byte ranges each record's digest covers."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - info, -vv - debug, -vvv - trace"),
        )
}

fn main() {
    let matches = command().get_matches();
    let app = SealDump::from_cli_matches(&matches);
    if !app.run() {
        exit(1);
    }
}
