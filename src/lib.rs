//! Vidicon: a NES (Famicom) console core.
//!
//! The `nes` module holds the whole machine: the 6502 interpreter, the
//! scanline PPU, the CPU/PPU bus fabric with OAM DMA, the controller port,
//! and a pure-function renderer from the PPU's per-frame product to a
//! 256x256 RGBA buffer. Hosts drive it with `Nes::step_frame` /
//! `Nes::latch_buttons`; everything else (GUI, audio, file pickers) lives
//! outside this crate.

pub mod nes;
