/// The console's two interrupt lines. The PPU drives NMI at vblank start;
/// IRQ is wired up for cartridge hardware but nothing in an NROM board
/// pulls it. Both lines are edge-consumed: the CPU deasserts on dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interrupts {
    nmi: bool,
    irq: bool,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert_nmi(&mut self) {
        self.nmi = true;
    }

    pub fn deassert_nmi(&mut self) {
        self.nmi = false;
    }

    pub fn is_nmi_asserted(&self) -> bool {
        self.nmi
    }

    pub fn assert_irq(&mut self) {
        self.irq = true;
    }

    pub fn deassert_irq(&mut self) {
        self.irq = false;
    }

    pub fn is_irq_asserted(&self) -> bool {
        self.irq
    }
}
