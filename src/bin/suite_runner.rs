use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use quick_xml::Reader;
use quick_xml::events::Event;
use sha1::{Digest, Sha1};
use vidicon::nes::Nes;

#[derive(Debug, Clone)]
struct SuiteTest {
    filename: String,
    system: String,
    runframes: u32,
    tvsha1: String,
    recordedinput: String,
}

#[derive(Debug, Clone)]
struct Config {
    suite: PathBuf,
    rom_root: PathBuf,
    max_tests: usize,
    include_recorded_input: bool,
    include_pal: bool,
    contains: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suite: PathBuf::from("external/nes-test-roms/test_roms.xml"),
            rom_root: PathBuf::from("external/nes-test-roms"),
            max_tests: 80,
            include_recorded_input: false,
            include_pal: false,
            contains: Vec::new(),
        }
    }
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--suite" => {
                let value = args
                    .next()
                    .context("--suite requires a path to test_roms.xml")?;
                cfg.suite = PathBuf::from(value);
            }
            "--rom-root" => {
                let value = args
                    .next()
                    .context("--rom-root requires a directory path")?;
                cfg.rom_root = PathBuf::from(value);
            }
            "--max-tests" => {
                let value = args
                    .next()
                    .context("--max-tests requires an integer, e.g. --max-tests 120")?;
                cfg.max_tests = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid --max-tests value: {value}"))?;
            }
            "--include-recorded-input" => cfg.include_recorded_input = true,
            "--include-pal" => cfg.include_pal = true,
            "--contains" => {
                let value = args
                    .next()
                    .context("--contains requires a substring, e.g. --contains palette")?;
                cfg.contains.push(value.to_lowercase());
            }
            "--help" | "-h" => {
                println!(
                    "ROM suite runner for vidicon\n\n\
Usage:\n\
  cargo run --bin suite_runner -- [options]\n\n\
Options:\n\
  --suite <path>               Path to test_roms.xml\n\
  --rom-root <path>            Root path containing ROM files\n\
  --max-tests <n>              Maximum number of tests to run (default 80)\n\
  --include-recorded-input     Include tests that replay recorded input\n\
  --include-pal                Include PAL tests\n\
  --contains <substr>          Only run matching filenames (repeatable)\n\
  -h, --help                   Show this help\n"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}\nUse --help to view supported options."),
        }
    }

    Ok(cfg)
}

fn parse_suite_xml(path: &Path) -> Result<Vec<SuiteTest>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite XML: {}", path.display()))?;

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut tests = Vec::new();
    let mut current: Option<SuiteTest> = None;
    let mut reading_tvsha1 = false;
    let mut reading_recorded = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                if name.as_ref() == b"test" {
                    let mut filename = String::new();
                    let mut system = String::new();
                    let mut runframes = 0u32;

                    for attr in e.attributes().flatten() {
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        match attr.key.as_ref() {
                            b"filename" => filename = value,
                            b"system" => system = value,
                            b"runframes" => runframes = value.parse::<u32>().unwrap_or(0),
                            _ => {}
                        }
                    }

                    current = Some(SuiteTest {
                        filename,
                        system,
                        runframes,
                        tvsha1: String::new(),
                        recordedinput: String::new(),
                    });
                } else if name.as_ref() == b"tvsha1" {
                    reading_tvsha1 = true;
                } else if name.as_ref() == b"recordedinput" {
                    reading_recorded = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map(|v| v.to_string()).unwrap_or_default();
                if let Some(test) = current.as_mut() {
                    if reading_tvsha1 {
                        test.tvsha1.push_str(&text);
                    } else if reading_recorded {
                        test.recordedinput.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if name.as_ref() == b"tvsha1" {
                    reading_tvsha1 = false;
                } else if name.as_ref() == b"recordedinput" {
                    reading_recorded = false;
                } else if name.as_ref() == b"test" {
                    if let Some(mut test) = current.take() {
                        test.tvsha1 = test.tvsha1.trim().to_string();
                        test.recordedinput = test.recordedinput.trim().to_string();
                        tests.push(test);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => anyhow::bail!("failed to parse suite XML: {err}"),
            _ => {}
        }
    }

    Ok(tests)
}

fn should_run(test: &SuiteTest, cfg: &Config) -> bool {
    if !cfg.include_pal && test.system.eq_ignore_ascii_case("pal") {
        return false;
    }
    if !cfg.include_recorded_input && !test.recordedinput.is_empty() {
        return false;
    }
    if !cfg.contains.is_empty() {
        let lower = test.filename.to_lowercase();
        if !cfg.contains.iter().any(|f| lower.contains(f)) {
            return false;
        }
    }
    true
}

fn hash_frame(frame_rgba: &[u8]) -> String {
    let digest = Sha1::digest(frame_rgba);
    BASE64_STANDARD.encode(digest)
}

enum Outcome {
    Pass,
    Mismatch(String),
    LoadError(String),
}

fn run_single(test: &SuiteTest, cfg: &Config) -> Outcome {
    let rom_path = cfg.rom_root.join(&test.filename);
    let mut nes = match Nes::from_rom_path(&rom_path) {
        Ok(nes) => nes,
        Err(err) => return Outcome::LoadError(format!("{err:#}")),
    };

    // One button byte per frame when the suite ships a replay script.
    let input = if test.recordedinput.is_empty() {
        Vec::new()
    } else {
        BASE64_STANDARD
            .decode(&test.recordedinput)
            .unwrap_or_default()
    };

    let frames = test.runframes.max(1);
    for frame in 0..frames {
        let state = input.get(frame as usize).copied().unwrap_or(0);
        nes.latch_buttons(state);
        nes.run_frame();
    }

    let got = hash_frame(nes.frame_buffer());
    if got == test.tvsha1 {
        Outcome::Pass
    } else {
        Outcome::Mismatch(got)
    }
}

fn main() -> Result<()> {
    let cfg = parse_args()?;
    let start = Instant::now();

    let tests = parse_suite_xml(&cfg.suite)?;
    let mut ran = 0usize;
    let mut passed = 0usize;
    let mut mismatched = 0usize;
    let mut load_errors = 0usize;

    for test in tests.iter().filter(|t| should_run(t, &cfg)) {
        if ran >= cfg.max_tests {
            break;
        }
        ran += 1;

        match run_single(test, &cfg) {
            Outcome::Pass => {
                passed += 1;
                println!("PASS {}", test.filename);
            }
            Outcome::Mismatch(got) => {
                mismatched += 1;
                println!(
                    "FAIL {} frames={} expected={} got={}",
                    test.filename, test.runframes, test.tvsha1, got
                );
            }
            Outcome::LoadError(err) => {
                load_errors += 1;
                println!("SKIP {} ({err})", test.filename);
            }
        }
    }

    println!();
    println!("Suite Summary");
    println!("- ran: {ran}");
    println!("- passed: {passed}");
    println!("- mismatched: {mismatched}");
    println!("- load errors (unsupported mapper etc.): {load_errors}");
    println!("- elapsed: {:.2}s", start.elapsed().as_secs_f32());

    Ok(())
}
