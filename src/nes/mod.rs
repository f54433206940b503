pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod dma;
pub mod interrupts;
mod palette;
pub mod ppu;
pub mod renderer;

use std::path::Path;

use anyhow::Result;

use bus::CpuBus;
use cartridge::Cartridge;
use cpu::Cpu;
use dma::OAM_DMA_STALL_CYCLES;
use ppu::Frame;

pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

#[derive(Debug, Clone, Copy, Default)]
pub struct NesDebugCounters {
    pub frame_count: u64,
    pub cpu_steps: u64,
    pub cpu_cycles: u64,
    pub dma_transfers: u64,
}

/// The console: CPU plus bus fabric, ticked in lockstep. One call to
/// `step_frame` runs instruction-by-instruction, feeding the PPU three dots
/// per CPU cycle, until the PPU hands back a finished frame.
pub struct Nes {
    cpu: Cpu,
    bus: CpuBus,
    frame_buffer: Vec<u8>,
    debug: NesDebugCounters,
}

impl Nes {
    pub fn new(cartridge: Cartridge) -> Self {
        let mut bus = CpuBus::new(cartridge);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        Self {
            cpu,
            bus,
            frame_buffer: vec![0; renderer::FRAME_BUFFER_SIZE],
            debug: NesDebugCounters::default(),
        }
    }

    pub fn from_rom_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(Cartridge::from_bytes(bytes)?))
    }

    pub fn from_rom_path(path: &Path) -> Result<Self> {
        Ok(Self::new(Cartridge::from_file(path)?))
    }

    pub fn reset(&mut self) {
        self.bus.ppu.reset();
        self.cpu.reset(&mut self.bus);
        self.debug = NesDebugCounters::default();
    }

    /// Deliver the host's button snapshot; call between frames.
    pub fn latch_buttons(&mut self, state: u8) {
        self.bus.controller.latch(state);
    }

    /// Run until the PPU completes the current frame and return its product.
    /// An armed OAM DMA preempts the next instruction and bills its stall.
    pub fn step_frame(&mut self) -> Frame {
        loop {
            let cycles = if self.bus.dma.is_pending() {
                self.bus.run_dma();
                self.debug.dma_transfers += 1;
                OAM_DMA_STALL_CYCLES
            } else {
                self.debug.cpu_steps += 1;
                self.cpu.step(&mut self.bus)
            };
            self.debug.cpu_cycles += u64::from(cycles);

            if let Some(frame) = self.bus.run_ppu(cycles * 3) {
                self.debug.frame_count += 1;
                return frame;
            }
        }
    }

    /// `step_frame` plus rasterization into the retained RGBA buffer.
    pub fn run_frame(&mut self) -> &[u8] {
        let frame = self.step_frame();
        self.frame_buffer = renderer::render(&frame);
        &self.frame_buffer
    }

    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    pub fn debug_counters(&self) -> NesDebugCounters {
        self.debug
    }

    pub fn debug_halted(&self) -> bool {
        self.cpu.halted
    }

    pub fn debug_cpu_regs(&self) -> (u8, u8, u8, u8, u8, u16) {
        (
            self.cpu.a,
            self.cpu.x,
            self.cpu.y,
            self.cpu.p,
            self.cpu.sp,
            self.cpu.pc,
        )
    }

    pub fn debug_peek_wram(&self, addr: u16) -> u8 {
        self.bus.wram[(addr as usize) & 0x07FF]
    }

    pub fn debug_peek_oam(&self, index: usize) -> u8 {
        self.bus.ppu.debug_peek_oam(index)
    }

    pub fn debug_peek_palette(&self, index: usize) -> u8 {
        self.bus.ppu.debug_peek_palette(index)
    }

    pub fn debug_peek_vram(&self, index: usize) -> u8 {
        self.bus.ppu.debug_peek_vram(index)
    }
}
