use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::builder::ValueParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use crashline::common::ByteView;
use crashline::pdb::Pdb;
use crashline::{parse_address, AnchorConfig, Annotator};

fn load_anchors(matches: &ArgMatches) -> Result<AnchorConfig> {
    let Some(path) = matches.get_one::<PathBuf>("anchors") else {
        return Ok(AnchorConfig::default());
    };

    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read anchors from {}", path.display()))?;
    AnchorConfig::from_json(&json).context("failed to parse anchors")
}

fn read_report(matches: &ArgMatches) -> Result<String> {
    match matches.get_one::<PathBuf>("report") {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read report {}", path.display())),
        None => io::read_to_string(io::stdin()).context("failed to read report from stdin"),
    }
}

fn list_modules(pdb: &Pdb<ByteView<'_>>) -> Result<()> {
    let mut stdout = io::stdout().lock();
    for (index, module) in pdb.modules().iter().enumerate() {
        let stream = match module.symbol_stream {
            Some(stream) => stream.to_string(),
            None => "-".to_owned(),
        };
        writeln!(
            stdout,
            "{index:>5} {stream:>6} {:>8} {:>8} {}",
            module.symbols_size, module.c13_size, module.name
        )?;
    }
    Ok(())
}

fn execute(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("pdb")
        .context("missing pdb path")?;
    let view = ByteView::open(path).context("failed to open file")?;

    if matches.get_flag("list_modules") {
        let pdb = Pdb::open(view).context("failed to parse pdb")?;
        return list_modules(&pdb);
    }

    let mut annotator = Annotator::new(load_anchors(matches)?);
    if let Some(&address) = matches.get_one::<u64>("main_va") {
        annotator = annotator.with_anchor(address);
    }

    let report = read_report(matches)?;
    let annotated = annotator
        .annotate(&report, view)
        .context("failed to annotate report")?;

    io::stdout()
        .lock()
        .write_all(annotated.as_bytes())
        .context("failed to write report")?;
    Ok(())
}

fn parse_addr(addr: &str) -> Result<u64> {
    parse_address(addr).context("expected a 0x prefixed hexadecimal address")
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let about = r#"crashline annotates the stack traces of Windows crash reports with source file and line numbers.

The report is read from the given file or from standard input. Its addresses are calibrated either from a "Main is at 0x...:" line or from the top stack frame of a build listed in the anchors file. Every stack frame that resolves to a source location in the PDB is annotated, and the report is printed to standard output."#;
    let matches = Command::new("crashline")
        .about(about)
        .arg(
            Arg::new("pdb")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to the PDB file of the crashed binary."),
        )
        .arg(
            Arg::new("report")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the crash report. Reads from standard input if omitted."),
        )
        .arg(
            Arg::new("anchors")
                .short('a')
                .long("anchors")
                .value_parser(value_parser!(PathBuf))
                .help("JSON file with the fallback anchors of builds that do not print their Main address."),
        )
        .arg(
            Arg::new("main_va")
                .long("main-va")
                .value_parser(ValueParser::new(parse_addr))
                .help("Virtual address of Main in the crashed process. Overrides the anchor in the report."),
        )
        .arg(
            Arg::new("list_modules")
                .long("list-modules")
                .action(ArgAction::SetTrue)
                .help("List the modules of the PDB instead of annotating a report."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log calibration details to standard error."),
        )
        .get_matches();

    init_logging(matches.get_flag("verbose"));

    match execute(&matches) {
        Ok(()) => (),
        Err(e) => {
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };
}
