// IrqHub - Interrupt Aggregation Controller Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// One output interrupt line of the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputLine {
    level: DigitalLevel,
}

impl OutputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, level: DigitalLevel) {
        self.level = level;
    }

    pub fn get(&self) -> DigitalLevel {
        self.level
    }

    pub fn is_high(&self) -> bool {
        self.level == DigitalLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_level_conversions() {
        let level: DigitalLevel = true.into();
        assert_eq!(level, DigitalLevel::High);
        let b: bool = DigitalLevel::Low.into();
        assert!(!b);
    }

    #[test]
    fn test_output_line() {
        let mut line = OutputLine::new();
        assert!(!line.is_high());
        line.set(DigitalLevel::High);
        assert!(line.is_high());
        line.set(DigitalLevel::Low);
        assert_eq!(line.get(), DigitalLevel::Low);
    }
}
