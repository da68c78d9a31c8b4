// IrqHub - Interrupt Aggregation Controller Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML descriptors
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_sources_per_channel() -> u8 {
    32
}

/// Register window stride between consecutive channels, in bytes.
/// The reference part places channel i's enable register at `stride * i`
/// and its status register at `stride * i + 4`.
fn default_register_stride() -> u64 {
    0x100
}

/// Validation failures for a [`ControllerDescriptor`].
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("Controller '{0}' must have at least one input channel")]
    NoChannels(String),
    #[error("Controller '{0}' must have at least one output line")]
    NoOutputs(String),
    #[error("sources_per_channel must be between 1 and 32, got {0}")]
    BadSourceWidth(u8),
    #[error("register_stride {0:#x} is too small or not 32-bit aligned")]
    BadStride(u64),
    #[error("output_map has {got} entries, expected one per channel ({want})")]
    MapLength { got: usize, want: usize },
    #[error("output_map entry {index} points at output {output}, but only {outputs} outputs exist")]
    MapOutOfRange {
        index: usize,
        output: usize,
        outputs: usize,
    },
    #[error("output_irqs has {got} entries, expected one per output ({want})")]
    IrqLength { got: usize, want: usize },
    #[error("{channels} channels with {outputs} outputs requires an explicit output_map")]
    MapRequired { channels: usize, outputs: usize },
}

/// Static configuration of one interrupt aggregation controller.
///
/// Variants of the part (different channel counts, different output fan-out)
/// are all expressed as descriptor values; there is exactly one controller
/// type in the core crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    /// Number of input channels (N). Each channel groups up to 32 sources.
    pub num_channels: usize,
    /// Number of output interrupt lines (M).
    pub num_outputs: usize,
    #[serde(default = "default_sources_per_channel")]
    pub sources_per_channel: u8,
    /// Channel index -> output line index. Defaults to identity when N == M.
    #[serde(default)]
    pub output_map: Option<Vec<usize>>,
    #[serde(default = "default_register_stride")]
    pub register_stride: u64,
    /// Downstream IRQ number for each output line, used by the MMIO adapter
    /// to report asserted lines at tick time. Optional.
    #[serde(default)]
    pub output_irqs: Option<Vec<u32>>,
}

impl ControllerDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read controller descriptor at {:?}", path))?;

        let desc: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON descriptor from {:?}", path))?
        } else {
            if !path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
            {
                tracing::warn!("Unknown descriptor extension for {:?}, assuming YAML", path);
            }
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML descriptor from {:?}", path))?
        };

        desc.validate()?;
        Ok(desc)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let desc: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Controller Descriptor YAML")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.schema_version != "1.0" {
            return Err(DescriptorError::UnsupportedSchema(
                self.schema_version.clone(),
            ));
        }
        if self.num_channels == 0 {
            return Err(DescriptorError::NoChannels(self.name.clone()));
        }
        if self.num_outputs == 0 {
            return Err(DescriptorError::NoOutputs(self.name.clone()));
        }
        if self.sources_per_channel == 0 || self.sources_per_channel > 32 {
            return Err(DescriptorError::BadSourceWidth(self.sources_per_channel));
        }
        if self.register_stride < 8 || self.register_stride % 4 != 0 {
            return Err(DescriptorError::BadStride(self.register_stride));
        }

        match &self.output_map {
            Some(map) => {
                if map.len() != self.num_channels {
                    return Err(DescriptorError::MapLength {
                        got: map.len(),
                        want: self.num_channels,
                    });
                }
                for (index, &output) in map.iter().enumerate() {
                    if output >= self.num_outputs {
                        return Err(DescriptorError::MapOutOfRange {
                            index,
                            output,
                            outputs: self.num_outputs,
                        });
                    }
                }
            }
            None => {
                if self.num_channels != self.num_outputs {
                    return Err(DescriptorError::MapRequired {
                        channels: self.num_channels,
                        outputs: self.num_outputs,
                    });
                }
            }
        }

        if let Some(irqs) = &self.output_irqs {
            if irqs.len() != self.num_outputs {
                return Err(DescriptorError::IrqLength {
                    got: irqs.len(),
                    want: self.num_outputs,
                });
            }
        }

        Ok(())
    }

    /// Channel -> output map with the identity default applied.
    pub fn resolved_output_map(&self) -> Vec<usize> {
        match &self.output_map {
            Some(map) => map.clone(),
            None => (0..self.num_channels).collect(),
        }
    }

    /// Bitmask covering the configured source width of one channel.
    pub fn source_mask(&self) -> u32 {
        if self.sources_per_channel >= 32 {
            u32::MAX
        } else {
            (1u32 << self.sources_per_channel) - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_descriptor() {
        let yaml = r#"
schema_version: "1.0"
name: "intc0"
num_channels: 9
num_outputs: 9
register_stride: 0x100
"#;
        let desc = ControllerDescriptor::from_yaml(yaml).unwrap();
        assert_eq!(desc.name, "intc0");
        assert_eq!(desc.num_channels, 9);
        assert_eq!(desc.sources_per_channel, 32);
        assert_eq!(desc.source_mask(), u32::MAX);
        assert_eq!(desc.resolved_output_map(), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
name: "intc0"
num_channels: 1
num_outputs: 1
"#;
        let err = ControllerDescriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("schema_version"));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let yaml = r#"
name: "intc0"
num_channels: 0
num_outputs: 1
"#;
        let err = ControllerDescriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("input channel"));
    }

    #[test]
    fn test_map_required_when_counts_differ() {
        let yaml = r#"
name: "intc0"
num_channels: 4
num_outputs: 2
"#;
        let err = ControllerDescriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("output_map"));
    }

    #[test]
    fn test_explicit_map_validated() {
        let yaml = r#"
name: "intc0"
num_channels: 4
num_outputs: 2
output_map: [0, 0, 1, 1]
"#;
        let desc = ControllerDescriptor::from_yaml(yaml).unwrap();
        assert_eq!(desc.resolved_output_map(), vec![0, 0, 1, 1]);

        let yaml = r#"
name: "intc0"
num_channels: 4
num_outputs: 2
output_map: [0, 0, 1, 2]
"#;
        let err = ControllerDescriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("output 2"));
    }

    #[test]
    fn test_narrow_source_width() {
        let yaml = r#"
name: "intc0"
num_channels: 1
num_outputs: 1
sources_per_channel: 20
"#;
        let desc = ControllerDescriptor::from_yaml(yaml).unwrap();
        assert_eq!(desc.source_mask(), 0x000F_FFFF);

        let yaml = r#"
name: "intc0"
num_channels: 1
num_outputs: 1
sources_per_channel: 33
"#;
        assert!(ControllerDescriptor::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_irq_map_length_checked() {
        let yaml = r#"
name: "intc0"
num_channels: 2
num_outputs: 2
output_irqs: [40, 41, 42]
"#;
        let err = ControllerDescriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("output_irqs"));
    }
}
