// IrqHub - Interrupt Aggregation Controller Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod aggregator;
pub mod channel;
pub mod mmio;
pub mod signals;

pub use aggregator::{AggregatorConfig, ConfigError, InterruptAggregator, RegisterKind};
pub use mmio::MmioIntc;
pub use signals::DigitalLevel;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Malformed snapshot: {0}")]
    Snapshot(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Default)]
pub struct PeripheralTickResult {
    pub irq: bool,
    pub cycles: u32,
    pub explicit_irqs: Vec<u32>,
}

/// Trait representing a memory-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;
    fn tick(&mut self) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}
