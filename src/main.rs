use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use sha1::{Digest, Sha1};
use vidicon::nes::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP, Nes,
};

#[derive(Debug, Clone)]
struct Config {
    rom: PathBuf,
    frames: u32,
    hash_stride: u32,
    scripted_input: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom: PathBuf::new(),
            frames: 600,
            hash_stride: 0,
            scripted_input: false,
        }
    }
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rom" => {
                let value = args
                    .next()
                    .context("--rom requires a path, e.g. --rom roms/smb.nes")?;
                cfg.rom = PathBuf::from(value);
            }
            "--frames" => {
                let value = args
                    .next()
                    .context("--frames requires an integer, e.g. --frames 600")?;
                cfg.frames = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --frames value: {value}"))?;
            }
            "--hash-every" => {
                let value = args
                    .next()
                    .context("--hash-every requires an integer, e.g. --hash-every 60")?;
                cfg.hash_stride = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --hash-every value: {value}"))?;
            }
            "--scripted-input" => cfg.scripted_input = true,
            "--help" | "-h" => {
                println!(
                    "vidicon headless frame runner\n\n\
Usage:\n\
  cargo run --release -- --rom <path> [options]\n\n\
Options:\n\
  --rom <path>          iNES ROM to run (NROM only)\n\
  --frames <n>          Frames to emulate (default 600)\n\
  --hash-every <n>      Print a frame SHA-1 every n frames (default off)\n\
  --scripted-input      Feed a deterministic pseudo-random button pattern\n\
  -h, --help            Show this help\n"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    if cfg.rom.as_os_str().is_empty() {
        anyhow::bail!("--rom is required; see --help");
    }
    Ok(cfg)
}

// Xorshift32 for deterministic pseudo-random controller patterns.
fn next_state(seed: &mut u32) -> u8 {
    let mut x = *seed;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *seed = x;

    let mut state = 0u8;
    if (x & 0x0001) != 0 {
        state |= BUTTON_UP;
    }
    if (x & 0x0002) != 0 {
        state |= BUTTON_DOWN;
    }
    if (x & 0x0004) != 0 {
        state |= BUTTON_LEFT;
    }
    if (x & 0x0008) != 0 {
        state |= BUTTON_RIGHT;
    }
    if (x & 0x0010) != 0 {
        state |= BUTTON_A;
    }
    if (x & 0x0020) != 0 {
        state |= BUTTON_B;
    }
    if (x & 0x0040) != 0 {
        state |= BUTTON_START;
    }
    if (x & 0x0080) != 0 {
        state |= BUTTON_SELECT;
    }

    // Avoid impossible opposite directions.
    if (state & BUTTON_UP) != 0 && (state & BUTTON_DOWN) != 0 {
        state &= !BUTTON_DOWN;
    }
    if (state & BUTTON_LEFT) != 0 && (state & BUTTON_RIGHT) != 0 {
        state &= !BUTTON_RIGHT;
    }

    state
}

fn hash_frame(frame_rgba: &[u8]) -> String {
    let digest = Sha1::digest(frame_rgba);
    BASE64_STANDARD.encode(digest)
}

fn main() -> Result<()> {
    let cfg = parse_args()?;
    let start = Instant::now();

    let mut nes = Nes::from_rom_path(&cfg.rom)
        .with_context(|| format!("failed to load ROM {}", cfg.rom.display()))?;

    let mut seed = 0x1D1CC0DEu32;
    let mut state = 0u8;

    for frame in 0..cfg.frames {
        if cfg.scripted_input && frame % 15 == 0 {
            state = next_state(&mut seed);
        }
        nes.latch_buttons(if cfg.scripted_input { state } else { 0 });
        nes.run_frame();

        if cfg.hash_stride > 0 && (frame + 1) % cfg.hash_stride == 0 {
            println!("frame={:05} sha1={}", frame + 1, hash_frame(nes.frame_buffer()));
        }
    }

    let debug = nes.debug_counters();
    println!();
    println!("Run Summary");
    println!("- rom: {}", cfg.rom.display());
    println!("- frames: {}", debug.frame_count);
    println!("- cpu steps: {}", debug.cpu_steps);
    println!("- cpu cycles: {}", debug.cpu_cycles);
    println!("- dma transfers: {}", debug.dma_transfers);
    println!("- halted: {}", nes.debug_halted());
    println!("- final frame sha1: {}", hash_frame(nes.frame_buffer()));
    println!("- elapsed: {:.2}s", start.elapsed().as_secs_f32());

    Ok(())
}
