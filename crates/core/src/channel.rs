// IrqHub - Interrupt Aggregation Controller Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Lifecycle of one interrupt source within its channel.
///
/// `Disabled -> Enabled` on the first enable-register write naming the bit;
/// `Enabled <-> Masked` while firmware toggles the same bit during the
/// source's service routine. A masked source still counts as enabled for
/// selection purposes, it is only suppressed from re-triggering the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    #[default]
    Disabled,
    Enabled,
    Masked,
}

/// Classified intent of one enable-register write.
///
/// The hardware reuses a single register for enabling sources and for
/// mask/unmask toggling during a source ISR. The intent is derived from the
/// write value, the set of already-enabled sources and the previous raw
/// register value, then applied as an explicit state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableWriteIntent {
    /// All-zero write with nothing enabled: pure register mirror update.
    DisableAll,
    /// The write names sources that were never enabled: turn them on.
    Enable { bits: u32 },
    /// Changed bits are being raised back to 1: leave ISR mode.
    Unmask { change: u32 },
    /// Changed bits are being dropped to 0: enter ISR mode.
    Mask { change: u32 },
}

pub const SOURCES_PER_CHANNEL: usize = 32;

/// State of one input channel: up to 32 sources, a latched status word
/// presented to firmware, and a pending word for events that arrived while
/// the channel was busy.
#[derive(Debug, Serialize, Deserialize)]
pub struct Channel {
    sources: [SourceState; SOURCES_PER_CHANNEL],
    /// Latched sources awaiting firmware service. Non-zero iff the channel's
    /// output line is driven high.
    pub(crate) status: u32,
    /// Sources that asserted while `status != 0` or while masked, replayed
    /// after firmware fully drains `status`.
    pub(crate) pending: u32,
    /// Raw mirror of the last enable-register write, used to classify the
    /// next write and returned verbatim on register reads.
    pub(crate) enable_mirror: u32,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            sources: [SourceState::Disabled; SOURCES_PER_CHANNEL],
            status: 0,
            pending: 0,
            enable_mirror: 0,
        }
    }
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources that contribute to this channel, masked or not.
    pub fn enabled_mask(&self) -> u32 {
        self.collect(|s| s != SourceState::Disabled)
    }

    /// Sources currently suppressed by their own service routine.
    pub fn masked_mask(&self) -> u32 {
        self.collect(|s| s == SourceState::Masked)
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn enable_mirror(&self) -> u32 {
        self.enable_mirror
    }

    /// The channel is busy while firmware has unserviced status bits or any
    /// source sits in ISR mode. New events queue instead of latching.
    pub fn is_busy(&self) -> bool {
        self.status != 0 || self.masked_mask() != 0
    }

    pub fn classify_enable_write(&self, value: u32) -> EnableWriteIntent {
        let enabled = self.enabled_mask();
        if value == 0 && enabled == 0 {
            return EnableWriteIntent::DisableAll;
        }

        let bits = value & !enabled;
        if bits != 0 {
            return EnableWriteIntent::Enable { bits };
        }

        // No new sources: the write toggles already-enabled bits. Whether it
        // masks or unmasks is decided for the whole write, matching the
        // register-level protocol.
        let change = self.enable_mirror ^ value;
        if change & value != 0 {
            EnableWriteIntent::Unmask { change }
        } else {
            EnableWriteIntent::Mask { change }
        }
    }

    /// Classify and apply one enable-register write, updating the raw mirror.
    /// Returns the intent so callers can trace it.
    pub fn apply_enable_write(&mut self, value: u32) -> EnableWriteIntent {
        let intent = self.classify_enable_write(value);
        match intent {
            EnableWriteIntent::DisableAll => {}
            EnableWriteIntent::Enable { bits } => {
                self.transition(bits, SourceState::Disabled, SourceState::Enabled);
            }
            EnableWriteIntent::Unmask { change } => {
                self.transition(change, SourceState::Masked, SourceState::Enabled);
            }
            EnableWriteIntent::Mask { change } => {
                self.transition(change, SourceState::Enabled, SourceState::Masked);
            }
        }
        self.enable_mirror = value;
        intent
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn collect(&self, pred: impl Fn(SourceState) -> bool) -> u32 {
        let mut mask = 0;
        for (i, &s) in self.sources.iter().enumerate() {
            if pred(s) {
                mask |= 1 << i;
            }
        }
        mask
    }

    fn transition(&mut self, bits: u32, from: SourceState, to: SourceState) {
        for i in 0..SOURCES_PER_CHANNEL {
            if bits & (1 << i) != 0 && self.sources[i] == from {
                self.sources[i] = to;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_starts_empty() {
        let ch = Channel::new();
        assert_eq!(ch.enabled_mask(), 0);
        assert_eq!(ch.masked_mask(), 0);
        assert_eq!(ch.status(), 0);
        assert_eq!(ch.pending(), 0);
        assert!(!ch.is_busy());
    }

    #[test]
    fn test_first_write_enables() {
        let mut ch = Channel::new();
        let intent = ch.apply_enable_write(0b0110);
        assert_eq!(intent, EnableWriteIntent::Enable { bits: 0b0110 });
        assert_eq!(ch.enabled_mask(), 0b0110);
        assert_eq!(ch.masked_mask(), 0);
        assert_eq!(ch.enable_mirror(), 0b0110);
    }

    #[test]
    fn test_disable_all_only_updates_mirror() {
        let mut ch = Channel::new();
        let intent = ch.apply_enable_write(0);
        assert_eq!(intent, EnableWriteIntent::DisableAll);
        assert_eq!(ch.enabled_mask(), 0);
        assert_eq!(ch.enable_mirror(), 0);
    }

    #[test]
    fn test_mask_then_unmask_round_trip() {
        let mut ch = Channel::new();
        ch.apply_enable_write(0b11);

        // Dropping bit 0 while it is already enabled enters ISR mode.
        let intent = ch.apply_enable_write(0b10);
        assert_eq!(intent, EnableWriteIntent::Mask { change: 0b01 });
        assert_eq!(ch.enabled_mask(), 0b11);
        assert_eq!(ch.masked_mask(), 0b01);
        assert!(ch.is_busy());

        // Raising it again leaves ISR mode.
        let intent = ch.apply_enable_write(0b11);
        assert_eq!(intent, EnableWriteIntent::Unmask { change: 0b01 });
        assert_eq!(ch.masked_mask(), 0);
        assert!(!ch.is_busy());
    }

    #[test]
    fn test_rewrite_same_value_is_noop() {
        let mut ch = Channel::new();
        ch.apply_enable_write(0b11);
        let intent = ch.apply_enable_write(0b11);
        assert_eq!(intent, EnableWriteIntent::Mask { change: 0 });
        assert_eq!(ch.enabled_mask(), 0b11);
        assert_eq!(ch.masked_mask(), 0);
    }

    #[test]
    fn test_zero_write_with_enabled_sources_masks_previous_value() {
        let mut ch = Channel::new();
        ch.apply_enable_write(0b101);
        let intent = ch.apply_enable_write(0);
        assert_eq!(intent, EnableWriteIntent::Mask { change: 0b101 });
        assert_eq!(ch.enabled_mask(), 0b101);
        assert_eq!(ch.masked_mask(), 0b101);
    }

    #[test]
    fn test_enable_never_touches_mask() {
        let mut ch = Channel::new();
        ch.apply_enable_write(0b01);
        ch.apply_enable_write(0b00); // mask bit 0
        assert_eq!(ch.masked_mask(), 0b01);

        // A write introducing a new source is an enable event even though
        // bit 0 is currently masked.
        let intent = ch.apply_enable_write(0b11);
        assert_eq!(intent, EnableWriteIntent::Enable { bits: 0b10 });
        assert_eq!(ch.enabled_mask(), 0b11);
        assert_eq!(ch.masked_mask(), 0b01);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ch = Channel::new();
        ch.apply_enable_write(0xFF);
        ch.status = 0x0F;
        ch.pending = 0xF0;
        ch.reset();
        assert_eq!(ch.enabled_mask(), 0);
        assert_eq!(ch.status(), 0);
        assert_eq!(ch.pending(), 0);
        assert_eq!(ch.enable_mirror(), 0);
    }
}
