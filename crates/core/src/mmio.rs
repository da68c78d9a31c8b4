// IrqHub - Interrupt Aggregation Controller Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::aggregator::{ConfigError, InterruptAggregator, RegisterKind};
use crate::{Peripheral, PeripheralTickResult, SimResult, SimulationError};
use irqhub_config::ControllerDescriptor;

const ENABLE_OFFSET: u64 = 0x0;
const STATUS_OFFSET: u64 = 0x4;

/// Per-register assembly buffer for byte-granular bus writes. The semantic
/// registers are 32-bit; a write commits once all four bytes have arrived.
#[derive(Debug, Default, Clone, Copy)]
struct WriteAssembly {
    buf: u32,
    mask: u8,
}

impl WriteAssembly {
    /// Returns the full register value once the fourth byte lands.
    fn push(&mut self, byte_offset: u32, value: u8) -> Option<u32> {
        let shift = byte_offset * 8;
        self.buf &= !(0xFF << shift);
        self.buf |= (value as u32) << shift;
        self.mask |= 1 << byte_offset;

        if self.mask == 0x0F {
            let val = self.buf;
            *self = Self::default();
            Some(val)
        } else {
            None
        }
    }
}

/// Memory-mapped front end for [`InterruptAggregator`].
///
/// Channel `i`'s enable register sits at `stride * i`, its status register at
/// `stride * i + 0x4`. Offsets inside the window that decode to neither are
/// read-as-zero / write-ignored; offsets past the window are access
/// violations, mirroring how the system bus treats unmapped addresses.
#[derive(Debug)]
pub struct MmioIntc {
    intc: InterruptAggregator,
    stride: u64,
    /// Downstream IRQ number per output line, reported at tick time.
    output_irqs: Option<Vec<u32>>,
    write_bufs: Vec<[WriteAssembly; 2]>,
}

impl MmioIntc {
    pub fn new(intc: InterruptAggregator, stride: u64) -> Result<Self, ConfigError> {
        // Each channel needs room for its two 32-bit registers; anything
        // narrower would alias the next channel's window.
        if stride < 8 || stride % 4 != 0 {
            return Err(ConfigError::BadStride(stride));
        }
        let write_bufs = vec![[WriteAssembly::default(); 2]; intc.num_channels()];
        Ok(Self {
            intc,
            stride,
            output_irqs: None,
            write_bufs,
        })
    }

    pub fn from_descriptor(desc: &ControllerDescriptor) -> Result<Self, ConfigError> {
        let intc = InterruptAggregator::from_descriptor(desc)?;
        let mut mmio = Self::new(intc, desc.register_stride)?;
        mmio.output_irqs = desc.output_irqs.clone();
        if let Some(irqs) = &mmio.output_irqs {
            tracing::debug!("{}: tick reports IRQs {:?}", desc.name, irqs);
        }
        Ok(mmio)
    }

    pub fn inner(&self) -> &InterruptAggregator {
        &self.intc
    }

    pub fn inner_mut(&mut self) -> &mut InterruptAggregator {
        &mut self.intc
    }

    /// Size of the register window in bytes.
    pub fn window_size(&self) -> u64 {
        self.stride * self.intc.num_channels() as u64
    }

    fn decode(&self, reg_offset: u64) -> Option<(usize, RegisterKind)> {
        let channel = (reg_offset / self.stride) as usize;
        if channel >= self.intc.num_channels() {
            return None;
        }
        match reg_offset % self.stride {
            ENABLE_OFFSET => Some((channel, RegisterKind::Enable)),
            STATUS_OFFSET => Some((channel, RegisterKind::Status)),
            _ => None,
        }
    }
}

impl Peripheral for MmioIntc {
    fn read(&self, offset: u64) -> SimResult<u8> {
        if offset >= self.window_size() {
            return Err(SimulationError::MemoryViolation(offset));
        }
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;

        let reg_val = match self.decode(reg_offset) {
            Some((channel, kind)) => self.intc.read_register(channel, kind),
            None => 0,
        };
        Ok(((reg_val >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        if offset >= self.window_size() {
            return Err(SimulationError::MemoryViolation(offset));
        }
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;

        let Some((channel, kind)) = self.decode(reg_offset) else {
            tracing::trace!("mmio: ignoring write to scratch offset {:#x}", offset);
            return Ok(());
        };

        let slot = match kind {
            RegisterKind::Enable => &mut self.write_bufs[channel][0],
            RegisterKind::Status => &mut self.write_bufs[channel][1],
        };
        if let Some(full) = slot.push(byte_offset, value) {
            self.intc.write_register(channel, kind, full);
        }
        Ok(())
    }

    fn tick(&mut self) -> PeripheralTickResult {
        let mut explicit_irqs = Vec::new();
        if let Some(irqs) = &self.output_irqs {
            for (output, &irq) in irqs.iter().enumerate() {
                if self.intc.output_is_high(output) {
                    explicit_irqs.push(irq);
                }
            }
        }
        PeripheralTickResult {
            explicit_irqs,
            ..Default::default()
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        self.intc.snapshot()
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        self.intc.restore(state)?;
        // Half-assembled register writes from before the snapshot must not
        // commit with bytes arriving after it.
        for bufs in &mut self.write_bufs {
            *bufs = [WriteAssembly::default(); 2];
        }
        Ok(())
    }
}
