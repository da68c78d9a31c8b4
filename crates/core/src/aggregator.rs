// IrqHub - Interrupt Aggregation Controller Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::channel::{Channel, EnableWriteIntent};
use crate::signals::{DigitalLevel, OutputLine};
use crate::{SimResult, SimulationError};
use irqhub_config::ControllerDescriptor;
use serde::Deserialize;

/// Writing all ones to a status register re-initializes it instead of
/// acknowledging sources.
const STATUS_REINIT: u32 = 0xFFFF_FFFF;

/// Per-channel register selector as seen by the downstream register decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Enable,
    Status,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Controller needs at least one channel and one output line")]
    Empty,
    #[error("Output map has {got} entries, expected one per channel ({want})")]
    MapLength { got: usize, want: usize },
    #[error("Channel {channel} maps to output {output}, but only {outputs} outputs exist")]
    MapOutOfRange {
        channel: usize,
        output: usize,
        outputs: usize,
    },
    #[error("Register stride {0:#x} is too small or not 32-bit aligned")]
    BadStride(u64),
}

/// Resolved, immutable configuration of one aggregator instance.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub name: String,
    pub num_channels: usize,
    pub num_outputs: usize,
    /// Channel index -> output line index.
    pub output_map: Vec<usize>,
    /// Bits above the configured source width never select.
    pub source_mask: u32,
}

impl AggregatorConfig {
    /// N channels, N outputs, channel i driving output i, 32 sources each.
    pub fn identity(num_channels: usize) -> Self {
        Self {
            name: "intc".to_string(),
            num_channels,
            num_outputs: num_channels,
            output_map: (0..num_channels).collect(),
            source_mask: u32::MAX,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_channels == 0 || self.num_outputs == 0 {
            return Err(ConfigError::Empty);
        }
        if self.output_map.len() != self.num_channels {
            return Err(ConfigError::MapLength {
                got: self.output_map.len(),
                want: self.num_channels,
            });
        }
        for (channel, &output) in self.output_map.iter().enumerate() {
            if output >= self.num_outputs {
                return Err(ConfigError::MapOutOfRange {
                    channel,
                    output,
                    outputs: self.num_outputs,
                });
            }
        }
        Ok(())
    }
}

impl From<&ControllerDescriptor> for AggregatorConfig {
    fn from(desc: &ControllerDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            num_channels: desc.num_channels,
            num_outputs: desc.num_outputs,
            output_map: desc.resolved_output_map(),
            source_mask: desc.source_mask(),
        }
    }
}

/// Multi-channel interrupt aggregation controller.
///
/// Collects per-channel source events delivered by an external OR-reduction
/// (`notify`), latches them into a status word that firmware acknowledges
/// through status-register writes, and drives one output line per channel.
/// Events arriving while a channel is busy queue in `pending` and replay
/// exactly once after firmware fully drains the status word.
///
/// All operations run to completion on `&mut self`; malformed stimuli from
/// the guest or from miswired collaborators are logged and ignored, never
/// fatal.
#[derive(Debug)]
pub struct InterruptAggregator {
    config: AggregatorConfig,
    channels: Vec<Channel>,
    outputs: Vec<OutputLine>,
}

#[derive(Deserialize)]
struct AggregatorSnapshot {
    channels: Vec<Channel>,
    outputs: Vec<OutputLine>,
}

impl InterruptAggregator {
    pub fn new(config: AggregatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let channels = (0..config.num_channels).map(|_| Channel::new()).collect();
        let outputs = vec![OutputLine::new(); config.num_outputs];
        Ok(Self {
            config,
            channels,
            outputs,
        })
    }

    pub fn from_descriptor(desc: &ControllerDescriptor) -> Result<Self, ConfigError> {
        Self::new(AggregatorConfig::from(desc))
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn num_channels(&self) -> usize {
        self.config.num_channels
    }

    pub fn num_outputs(&self) -> usize {
        self.config.num_outputs
    }

    /// Ingest a level snapshot of one channel's OR-reduced sources.
    ///
    /// `asserted_mask` carries the sources currently at a high level. The
    /// call is idempotent with respect to level state: redundant calls and
    /// all-zero masks are no-ops. If the channel is busy (unserviced status
    /// or a source in ISR mode), selected sources queue in `pending` instead
    /// of latching.
    pub fn notify(&mut self, channel: usize, asserted_mask: u32) {
        let Some(ch) = self.channels.get_mut(channel) else {
            tracing::warn!(
                "{}: notify for invalid channel index {}",
                self.config.name,
                channel
            );
            return;
        };

        let select = asserted_mask & ch.enabled_mask() & self.config.source_mask;
        if select == 0 {
            return;
        }
        tracing::trace!("{}: ch{} select {:#010x}", self.config.name, channel, select);

        if ch.is_busy() {
            ch.pending |= select;
            tracing::debug!(
                "{}: ch{} busy, pending now {:#010x}",
                self.config.name,
                channel,
                ch.pending
            );
        } else {
            ch.status = select;
            tracing::debug!(
                "{}: ch{} latched status {:#010x}",
                self.config.name,
                channel,
                select
            );
            self.drive_output(channel, DigitalLevel::High);
        }
    }

    /// Handle a write to a channel's enable register.
    ///
    /// Bits never enabled before turn the sources on; toggling an
    /// already-enabled bit enters or leaves that source's ISR mode. See
    /// [`crate::channel::EnableWriteIntent`].
    pub fn write_enable(&mut self, channel: usize, value: u32) {
        let Some(ch) = self.channels.get_mut(channel) else {
            tracing::warn!(
                "{}: enable write for invalid channel index {}",
                self.config.name,
                channel
            );
            return;
        };

        match ch.apply_enable_write(value) {
            EnableWriteIntent::DisableAll => {
                tracing::debug!("{}: ch{} all sources disabled", self.config.name, channel);
            }
            EnableWriteIntent::Enable { bits } => {
                tracing::debug!(
                    "{}: ch{} enabled {:#010x}, now {:#010x}",
                    self.config.name,
                    channel,
                    bits,
                    ch.enabled_mask()
                );
            }
            EnableWriteIntent::Unmask { change } => {
                tracing::debug!(
                    "{}: ch{} unmask {:#010x}, masked now {:#010x}",
                    self.config.name,
                    channel,
                    change,
                    ch.masked_mask()
                );
            }
            EnableWriteIntent::Mask { change } => {
                tracing::debug!(
                    "{}: ch{} mask {:#010x}, masked now {:#010x}",
                    self.config.name,
                    channel,
                    change,
                    ch.masked_mask()
                );
            }
        }
    }

    /// Handle a write to a channel's status register (acknowledgment).
    ///
    /// Each set bit clears one latched source. An all-ones write
    /// re-initializes the register without replay or line changes. When the
    /// last latched bit is acknowledged, queued pending sources replay as a
    /// fresh status word, otherwise the output line drops.
    pub fn write_status(&mut self, channel: usize, value: u32) {
        if value == 0 {
            tracing::warn!(
                "{}: invalid zero status write on channel {}",
                self.config.name,
                channel
            );
            return;
        }
        let Some(ch) = self.channels.get_mut(channel) else {
            tracing::warn!(
                "{}: status write for invalid channel index {}",
                self.config.name,
                channel
            );
            return;
        };

        ch.status &= !value;

        if value == STATUS_REINIT {
            return;
        }

        if ch.status != 0 {
            // Partial acknowledgment, the line stays asserted.
            return;
        }

        if ch.pending != 0 {
            ch.status = ch.pending;
            ch.pending = 0;
            tracing::debug!(
                "{}: ch{} replaying pending as status {:#010x}",
                self.config.name,
                channel,
                ch.status
            );
            self.drive_output(channel, DigitalLevel::High);
        } else {
            tracing::debug!("{}: ch{} drained", self.config.name, channel);
            self.sync_output(channel);
        }
    }

    /// Settle the line mapped to `channel` after a drain. With fan-in maps
    /// several channels share one output, so the line only drops once no
    /// channel mapped to it is latched.
    fn sync_output(&mut self, channel: usize) {
        let Some(&output) = self.config.output_map.get(channel) else {
            return;
        };
        let latched = self
            .channels
            .iter()
            .zip(self.config.output_map.iter())
            .any(|(ch, &out)| out == output && ch.status() != 0);
        self.drive_output(channel, DigitalLevel::from(latched));
    }

    pub fn write_register(&mut self, channel: usize, kind: RegisterKind, value: u32) {
        match kind {
            RegisterKind::Enable => self.write_enable(channel, value),
            RegisterKind::Status => self.write_status(channel, value),
        }
    }

    /// Raw register read: the last value written to the enable register, or
    /// the currently latched status. Reads have no side effects.
    pub fn read_register(&self, channel: usize, kind: RegisterKind) -> u32 {
        let Some(ch) = self.channels.get(channel) else {
            tracing::warn!(
                "{}: register read for invalid channel index {}",
                self.config.name,
                channel
            );
            return 0;
        };
        match kind {
            RegisterKind::Enable => ch.enable_mirror(),
            RegisterKind::Status => ch.status(),
        }
    }

    /// Set the output line mapped to `channel`. Out-of-range indices are
    /// logged and ignored so a miswired collaborator cannot take the
    /// controller down.
    pub fn drive_output(&mut self, channel: usize, level: DigitalLevel) {
        let Some(&output) = self.config.output_map.get(channel) else {
            tracing::warn!(
                "{}: drive for invalid channel index {}",
                self.config.name,
                channel
            );
            return;
        };
        let Some(line) = self.outputs.get_mut(output) else {
            tracing::warn!(
                "{}: channel {} maps to invalid output index {}",
                self.config.name,
                channel,
                output
            );
            return;
        };
        tracing::trace!(
            "{}: output {} -> {:?}",
            self.config.name,
            output,
            level
        );
        line.set(level);
    }

    pub fn output_level(&self, output: usize) -> Option<DigitalLevel> {
        self.outputs.get(output).map(|line| line.get())
    }

    pub fn output_is_high(&self, output: usize) -> bool {
        self.outputs.get(output).is_some_and(|line| line.is_high())
    }

    /// External reset: all channel state, mirrors and lines return to zero.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
        for line in &mut self.outputs {
            line.set(DigitalLevel::Low);
        }
    }

    pub fn channel(&self, channel: usize) -> Option<&Channel> {
        self.channels.get(channel)
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "channels": self.channels,
            "outputs": self.outputs,
        })
    }

    pub fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let snap: AggregatorSnapshot =
            serde_json::from_value(state).map_err(|e| SimulationError::Snapshot(e.to_string()))?;
        if snap.channels.len() != self.config.num_channels
            || snap.outputs.len() != self.config.num_outputs
        {
            return Err(SimulationError::Snapshot(
                "channel/output count does not match configuration".to_string(),
            ));
        }
        self.channels = snap.channels;
        self.outputs = snap.outputs;
        Ok(())
    }
}
