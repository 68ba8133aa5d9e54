use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use quill::module::BinaryModule;
use quill::options::{DecompileOptions, Dialect, DEFAULT_MAX_SWEEPS};
use quill::timing::{PipelineReport, UnitTimings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DialectArg {
    C,
    Lua,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::C => Dialect::C,
            DialectArg::Lua => Dialect::Lua,
        }
    }
}

/// Decompile stack bytecode chunks into C-like or Lua source.
#[derive(Debug, Parser)]
#[command(name = "quill", version)]
struct Cli {
    /// Code chunk files, or directories scanned recursively for `*.gmc`.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = DialectArg::C)]
    dialect: DialectArg,

    /// Also write the instruction listing of every unit.
    #[arg(long)]
    asm: bool,

    /// Record the tree after every pipeline stage.
    #[arg(long)]
    snapshots: bool,

    /// Write one file per unit here instead of printing to stdout.
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// String table, one entry per line.
    #[arg(long)]
    strings: Option<PathBuf>,

    /// Object names, one per line, indexed by object id.
    #[arg(long)]
    objects: Option<PathBuf>,

    /// Upper bound on optimizer sweeps per fixpoint.
    #[arg(long, default_value_t = DEFAULT_MAX_SWEEPS)]
    max_sweeps: usize,

    /// Leave Lua output as printed.
    #[arg(long)]
    no_format: bool,

    /// Print per-phase timings and the slowest units.
    #[arg(long)]
    timings: bool,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> DecompileOptions {
        DecompileOptions {
            dialect: self.dialect.into(),
            snapshots: self.snapshots,
            max_sweeps: self.max_sweeps,
        }
    }
}

/// One input file and its path relative to the input it was found under.
#[derive(Debug, Clone)]
struct Unit {
    path: PathBuf,
    rel: PathBuf,
}

impl Unit {
    fn name(&self) -> String {
        self.rel.with_extension("").display().to_string()
    }
}

struct UnitReport {
    name: String,
    failed: bool,
    timings: UnitTimings,
    /// What goes to stdout when there is no output directory.
    printed: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let failed = run(&cli)?;
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Decompile every input. Returns the number of failed units.
fn run(cli: &Cli) -> Result<usize> {
    let module = load_module(cli)?;
    let units = collect_units(&cli.inputs)?;
    tracing::info!(units = units.len(), "decompiling");

    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }

    let options = cli.options();
    let reports: Vec<UnitReport> = units
        .par_iter()
        .map(|unit| process(cli, &options, &module, unit))
        .collect();

    let mut failed = Vec::new();
    let mut timing_report = PipelineReport::new();
    for report in reports {
        if cli.output_dir.is_none() {
            print!("{}", report.printed);
        }
        if report.failed {
            failed.push(report.name);
        }
        timing_report.add(report.timings);
    }

    if let Some(dir) = &cli.output_dir {
        let log = dir.join("errors.log");
        if failed.is_empty() {
            if log.exists() {
                fs::remove_file(&log).with_context(|| format!("removing {}", log.display()))?;
            }
        } else {
            let mut text = failed.join("\n");
            text.push('\n');
            fs::write(&log, text).with_context(|| format!("writing {}", log.display()))?;
        }
    }
    if !failed.is_empty() {
        tracing::warn!(failed = failed.len(), "some units did not decompile cleanly");
    }
    if cli.timings {
        eprint!("{}", timing_report.summary(10));
    }
    Ok(failed.len())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}

fn load_module(cli: &Cli) -> Result<BinaryModule> {
    let strings = match &cli.strings {
        Some(path) => read_lines(path)?,
        None => Vec::new(),
    };
    let objects = match &cli.objects {
        Some(path) => read_lines(path)?,
        None => Vec::new(),
    };
    Ok(BinaryModule::new(strings, objects))
}

fn collect_units(inputs: &[PathBuf]) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found = Vec::new();
            collect_gmc_files(input, &mut found)?;
            found.sort();
            for path in found {
                let rel = path.strip_prefix(input).unwrap_or(&path).to_path_buf();
                units.push(Unit { path, rel });
            }
        } else {
            let rel = PathBuf::from(input.file_name().unwrap_or(input.as_os_str()));
            units.push(Unit {
                path: input.clone(),
                rel,
            });
        }
    }
    Ok(units)
}

fn collect_gmc_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_gmc_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "gmc") {
            out.push(path);
        }
    }
    Ok(())
}

/// Decompile one unit and write its outputs. Never fails the batch.
fn process(cli: &Cli, options: &DecompileOptions, module: &BinaryModule, unit: &Unit) -> UnitReport {
    let name = unit.name();
    match process_unit(cli, options, module, unit, &name) {
        Ok(report) => report,
        Err(err) => {
            let error = format!("{:#}", err);
            tracing::error!(unit = %name, %error, "unit failed");
            UnitReport {
                timings: UnitTimings::new(name.clone()),
                name,
                failed: true,
                printed: String::new(),
            }
        }
    }
}

fn process_unit(
    cli: &Cli,
    options: &DecompileOptions,
    module: &BinaryModule,
    unit: &Unit,
    name: &str,
) -> Result<UnitReport> {
    let code = fs::read(&unit.path).with_context(|| format!("reading {}", unit.path.display()))?;

    let output = quill::decompile_unit(name, &code, module, options);
    if let Some(err) = &output.error {
        tracing::error!(unit = %name, error = %err, "decompilation failed");
    }

    let mut text = output.text.clone();
    if options.dialect == Dialect::Lua && !cli.no_format && output.error.is_none() {
        text = quill::format_lua(&text);
    }

    let mut printed = String::new();
    match &cli.output_dir {
        Some(dir) => {
            let base = dir.join(&unit.rel);
            if let Some(parent) = base.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            write_file(&base.with_extension(options.dialect.extension()), &text)?;
            if cli.asm {
                let listing = quill::disassemble(&code, module)
                    .unwrap_or_else(|err| format!("; {}\n", err));
                write_file(&base.with_extension("asm"), &listing)?;
            }
            for (i, (stage, dump)) in output.snapshots.iter().enumerate() {
                let file = format!("{}.{}.{}.txt", base.with_extension("").display(), i, stage.name());
                write_file(Path::new(&file), dump)?;
            }
        }
        None => {
            let comment = options.dialect.comment();
            printed.push_str(&format!("{} ==== {} ====\n", comment, name));
            if cli.asm {
                if let Ok(listing) = quill::disassemble(&code, module) {
                    printed.push_str(&listing);
                }
            }
            for (stage, dump) in &output.snapshots {
                printed.push_str(&format!("{} ---- {} ----\n{}", comment, stage.name(), dump));
            }
            printed.push_str(&text);
        }
    }

    Ok(UnitReport {
        name: name.to_string(),
        failed: output.failed(),
        timings: output.timings,
        printed,
    })
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;
    use quill_bytecode::asm::Assembler;
    use quill_bytecode::opcode::OpCode;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "quill",
            "--dialect",
            "lua",
            "--snapshots",
            "--max-sweeps",
            "8",
            "-vv",
            "-o",
            "out",
            "a.gmc",
            "dir",
        ])
        .unwrap();
        assert_eq!(cli.dialect, DialectArg::Lua);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert_eq!(cli.inputs, vec![PathBuf::from("a.gmc"), PathBuf::from("dir")]);
        let options = cli.options();
        assert_eq!(options.dialect, Dialect::Lua);
        assert_eq!(options.max_sweeps, 8);
        assert!(options.snapshots);
    }

    #[test]
    fn test_defaults_and_missing_input() {
        let cli = Cli::try_parse_from(["quill", "a.gmc"]).unwrap();
        assert_eq!(cli.dialect, DialectArg::C);
        assert_eq!(cli.max_sweeps, DEFAULT_MAX_SWEEPS);
        assert!(!cli.asm && !cli.no_format && !cli.timings);
        assert!(Cli::try_parse_from(["quill"]).is_err());
        assert!(Cli::try_parse_from(["quill", "--dialect", "pascal", "a.gmc"]).is_err());
    }

    #[test]
    fn test_failing_unit_does_not_stop_the_batch() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let good = Assembler::new()
            .push_int(1)
            .pop_var(-1, 0, false)
            .op(OpCode::Exit)
            .finish();
        fs::create_dir_all(input.path().join("nested")).unwrap();
        fs::write(input.path().join("nested/good.gmc"), good).unwrap();
        // not a whole number of words
        fs::write(input.path().join("bad.gmc"), [1u8, 2, 3]).unwrap();
        fs::write(input.path().join("notes.txt"), "ignored").unwrap();
        let strings = input.path().join("strings.txt");
        fs::write(&strings, "score\n").unwrap();

        let args: Vec<OsString> = vec![
            "quill".into(),
            "--asm".into(),
            "--strings".into(),
            strings.into_os_string(),
            "--output-dir".into(),
            output.path().into(),
            input.path().into(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let failed = run(&cli).unwrap();
        assert_eq!(failed, 1);

        let out = output.path();
        assert_eq!(
            fs::read_to_string(out.join("nested/good.gml")).unwrap(),
            "score = 1;\n"
        );
        assert!(out.join("nested/good.asm").exists());
        let bad = fs::read_to_string(out.join("bad.gml")).unwrap();
        assert!(bad.starts_with("// decompilation failed:"));
        assert_eq!(fs::read_to_string(out.join("errors.log")).unwrap(), "bad\n");
        assert!(!out.join("notes.gml").exists());
    }
}
