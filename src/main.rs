//! Command-line front end: argument handling, map-name filtering,
//! backups, and the per-file driver loop.
//!
//! Exit codes: 0 everything built, 1 nothing was built, 2 at least one
//! file failed, 3 fatal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;

use yabsp::build::{BuildConfig, BuildError, Report, build_level};
use yabsp::wad::Wad;

#[derive(Parser, Debug)]
#[command(
    name = "yabsp",
    version,
    about = "Yet Another BSP node builder for Doom WADs"
)]
struct Args {
    /// WAD files to process (updated in place)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Verbose output, show all warnings
    #[arg(short, long)]
    verbose: bool,

    /// Backup input files (.bak extension)
    #[arg(short, long)]
    backup: bool,

    /// Faster partition selection
    #[arg(short, long)]
    fast: bool,

    /// Control which map(s) are built, e.g. MAP01,MAP04-MAP07,E1M3
    #[arg(short, long, value_name = "RANGES")]
    map: Option<String>,

    /// Use XNOD format in the NODES lump
    #[arg(short = 'x', long)]
    xnod: bool,

    /// Use XGL3 format in the SSECTORS lump
    #[arg(short = 's', long)]
    ssect: bool,

    /// Cost assigned to seg splits
    #[arg(short, long, default_value_t = 11, value_parser = clap::value_parser!(i32).range(1..=32))]
    cost: i32,

    /// Copy the input file here and process the copy (single input only)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/*====================================================================*/
/*                       Map-name ranges                              */
/*====================================================================*/

#[derive(Clone, Debug)]
struct MapRange {
    low: String,
    high: String,
}

static MAP_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{1,7}$").unwrap());

fn validate_map_name(name: &str) -> Result<String> {
    if !MAP_NAME.is_match(name) {
        bail!("illegal map name: '{name}'");
    }
    Ok(name.to_ascii_uppercase())
}

fn parse_map_list(arg: &str) -> Result<Vec<MapRange>> {
    let mut list = Vec::new();

    for tok in arg.split(',') {
        if tok.is_empty() {
            bail!("bad map list (empty element)");
        }

        let (low, high) = match tok.split_once('-') {
            Some((lo, hi)) => (validate_map_name(lo)?, validate_map_name(hi)?),
            None => {
                let name = validate_map_name(tok)?;
                (name.clone(), name)
            }
        };

        if low.len() != high.len() {
            bail!("bad map range ({low} and {high} differ in length)");
        }
        if low.as_bytes()[0] != high.as_bytes()[0] {
            bail!("bad map range ({low} and {high} start with different letters)");
        }
        if low > high {
            bail!("bad map range (wrong order, {low} > {high})");
        }

        list.push(MapRange { low, high });
    }
    Ok(list)
}

fn map_in_list(ranges: &[MapRange], name: &str) -> bool {
    // no --map means everything
    if ranges.is_empty() {
        return true;
    }
    ranges
        .iter()
        .any(|r| name.len() == r.low.len() && *name >= *r.low && *name <= *r.high)
}

/*====================================================================*/
/*                       File handling                                */
/*====================================================================*/

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn validate_input_filename(path: &Path) -> Result<()> {
    // a backup cannot be backed up
    if has_extension(path, "bak") {
        bail!("cannot process a backup file: {}", path.display());
    }

    for ext in ["pak", "pk2", "pk3", "pk4", "pk7", "epk", "pack", "zip", "rar"] {
        if has_extension(path, ext) {
            bail!(
                "package files (like PK3) are not supported: {}",
                path.display()
            );
        }
    }

    for ext in [
        "exe", "dll", "com", "bat", "txt", "doc", "deh", "bex", "lmp", "cfg", "gif", "png", "jpg",
        "jpeg",
    ] {
        if has_extension(path, ext) {
            bail!("not a wad file: {}", path.display());
        }
    }
    Ok(())
}

fn backup_file(path: &Path) -> Result<PathBuf> {
    let dest = path.with_extension("bak");
    std::fs::copy(path, &dest)
        .with_context(|| format!("failed to create backup: {}", dest.display()))?;
    Ok(dest)
}

/*====================================================================*/
/*                       The driver loop                              */
/*====================================================================*/

#[derive(Default)]
struct Totals {
    built_maps: usize,
    failed_maps: usize,
    failed_files: usize,
    empty_files: usize,
}

fn build_file(
    path: &Path,
    ranges: &[MapRange],
    cfg: &BuildConfig,
    totals: &mut Totals,
) -> Result<()> {
    println!("Building {}", path.display());

    let mut wad = Wad::open(path).with_context(|| format!("cannot open {}", path.display()))?;

    if wad.level_count() == 0 {
        println!("  No levels in wad");
        totals.empty_files += 1;
        return Ok(());
    }

    let mut report = Report::default();
    let mut visited = 0usize;
    let mut failures = 0usize;

    for lev in 0..wad.level_count() {
        let name = wad.level_name(lev).to_owned();
        if !map_in_list(ranges, &name) {
            continue;
        }
        visited += 1;

        if cfg.verbosity > 0 {
            println!("  {name}");
        }

        match build_level(&mut wad, lev, cfg, &mut report) {
            Ok(()) => totals.built_maps += 1,
            Err(BuildError::LumpOverflow) => failures += 1,
            Err(BuildError::Cancelled) => bail!("CANCELLED"),
            Err(err @ (BuildError::BadData(_) | BuildError::Wad(_) | BuildError::Io(_))) => {
                println!("  Corrupted wad or level detected: {err}");
                totals.failed_files += 1;
                return Ok(());
            }
        }
    }

    if visited == 0 {
        println!("  No matching levels");
        totals.empty_files += 1;
        return Ok(());
    }

    totals.failed_maps += failures;
    if failures > 0 {
        println!("  Failed maps: {failures} (out of {visited})");
        totals.failed_files += 1;
    }

    println!("  Serious warnings: {}", report.warnings);
    if cfg.verbosity > 0 {
        println!("  Minor issues: {}", report.minor_issues);
    }
    Ok(())
}

fn run(args: &Args) -> Result<u8> {
    let ranges = match &args.map {
        Some(arg) => parse_map_list(arg)?,
        None => Vec::new(),
    };

    if let Some(output) = &args.output {
        if args.backup {
            bail!("cannot use --backup with --output");
        }
        if args.files.len() > 1 {
            bail!("cannot use multiple input files with --output");
        }
        if args.files[0] == *output {
            bail!("input and output files are the same");
        }
    }

    // validate every filename before touching any of them
    for path in &args.files {
        validate_input_filename(path)?;
        if !path.exists() {
            bail!("no such file: {}", path.display());
        }
    }

    let cfg = BuildConfig {
        fast: args.fast,
        force_xnod: args.xnod,
        ssect_xgl3: args.ssect,
        split_cost: args.cost,
        verbosity: args.verbose as u8,
        ..BuildConfig::default()
    };

    let mut totals = Totals::default();

    for path in &args.files {
        let mut target = path.clone();

        if let Some(output) = &args.output {
            std::fs::copy(path, output)
                .with_context(|| format!("failed to create output file: {}", output.display()))?;
            println!("Copied input file: {}", path.display());
            target = output.clone();
        }

        if args.backup {
            let dest = backup_file(&target)?;
            if args.verbose {
                println!("Created backup: {}", dest.display());
            }
        }

        build_file(&target, &ranges, &cfg, &mut totals)?;
    }

    if totals.failed_files > 0 {
        println!(
            "FAILURES occurred on {} map(s) in {} file(s).",
            totals.failed_maps, totals.failed_files
        );
        if !args.verbose {
            println!("Rerun with --verbose to see more details.");
        }
        Ok(2)
    } else if totals.built_maps == 0 {
        println!("NOTHING was built!");
        Ok(1)
    } else {
        println!("Ok, built {} map(s).", totals.built_maps);
        Ok(0)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.verbose {
        "debug"
    } else {
        "warn"
    }))
    .format_timestamp(None)
    .init();

    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("FATAL ERROR: {err:#}");
            ExitCode::from(3)
        }
    }
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_names_validate() {
        assert!(validate_map_name("MAP01").is_ok());
        assert_eq!(validate_map_name("e1m3").unwrap(), "E1M3");
        assert!(validate_map_name("X").is_err()); // too short
        assert!(validate_map_name("1MAP").is_err()); // leading digit
        assert!(validate_map_name("WAYTOOLONG").is_err());
        assert!(validate_map_name("BAD NAME").is_err());
    }

    #[test]
    fn ranges_parse_and_match() {
        let ranges = parse_map_list("MAP01,MAP04-MAP07,E1M9").unwrap();
        assert_eq!(ranges.len(), 3);

        for hit in ["MAP01", "MAP04", "MAP05", "MAP07", "E1M9"] {
            assert!(map_in_list(&ranges, hit), "{hit}");
        }
        for miss in ["MAP02", "MAP08", "E1M1", "MAP050"] {
            assert!(!map_in_list(&ranges, miss), "{miss}");
        }
    }

    #[test]
    fn bad_ranges_rejected() {
        assert!(parse_map_list("MAP01,,MAP02").is_err());
        assert!(parse_map_list("MAP01-E1M1").is_err()); // different letter
        assert!(parse_map_list("MAP07-MAP04").is_err()); // wrong order
        assert!(parse_map_list("MAP1-MAP007").is_err()); // length mismatch
    }

    #[test]
    fn empty_list_matches_everything() {
        assert!(map_in_list(&[], "MAP01"));
    }

    #[test]
    fn filename_screening() {
        assert!(validate_input_filename(Path::new("doom2.wad")).is_ok());
        assert!(validate_input_filename(Path::new("old.BAK")).is_err());
        assert!(validate_input_filename(Path::new("mod.pk3")).is_err());
        assert!(validate_input_filename(Path::new("readme.txt")).is_err());
    }
}
