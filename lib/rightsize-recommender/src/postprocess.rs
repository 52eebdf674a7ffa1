//! Adjustments applied to percentile estimates before they're returned as recommendations.
//!
//! Each stage works on whole units and truncates, so a recommendation is computed as:
//!
//! 1. the percentile estimate, truncated to an integer
//! 2. inflated by the buffer percentage, truncated again
//! 3. multiplied by the unit conversion factor
//!
//! Optionally, the final amounts are snapped up to a tier from a [`TierTable`].

use serde::{Deserialize, Serialize};

/// Truncates a percentile estimate to whole units.
///
/// Negative and NaN estimates become zero, and estimates too large for a `u64` saturate.
pub fn truncate(value: f64) -> u64 {
    value as u64
}

/// Inflates `amount` by `buffer_percent` percent, truncating the result.
///
/// The multiplication happens before the division, so `apply_buffer(1000, 20)` is exactly `1200`, and
/// `apply_buffer(999, 15)` is `1148`.
pub fn apply_buffer(amount: u64, buffer_percent: u32) -> u64 {
    let scaled = u128::from(amount) * (100 + u128::from(buffer_percent)) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Fixed multiplicative factors converting histogram units into the units recommendations are expressed in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnitConversion {
    /// Factor applied to CPU amounts.
    pub cpu_factor: u64,

    /// Factor applied to memory amounts.
    pub memory_factor: u64,
}

impl UnitConversion {
    /// Conversion that leaves amounts untouched.
    pub const IDENTITY: UnitConversion = UnitConversion {
        cpu_factor: 1,
        memory_factor: 1,
    };

    /// Converts both amounts.
    pub fn convert(&self, amounts: ResourceAmounts) -> ResourceAmounts {
        ResourceAmounts {
            cpu: amounts.cpu.saturating_mul(self.cpu_factor),
            memory: amounts.memory.saturating_mul(self.memory_factor),
        }
    }
}

impl Default for UnitConversion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A pair of CPU and memory amounts.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ResourceAmounts {
    /// CPU amount.
    pub cpu: u64,

    /// Memory amount.
    pub memory: u64,
}

impl ResourceAmounts {
    /// Applies the buffer to both amounts.
    pub fn with_buffer(self, buffer_percent: u32) -> Self {
        Self {
            cpu: apply_buffer(self.cpu, buffer_percent),
            memory: apply_buffer(self.memory, buffer_percent),
        }
    }

    /// Returns `true` if `tier` provides at least as much of both resources.
    pub fn fits_within(&self, tier: &ResourceTier) -> bool {
        tier.cpu >= self.cpu && tier.memory >= self.memory
    }
}

/// A supported combination of CPU and memory, such as a Fargate task size or an instance type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ResourceTier {
    /// Name of the tier, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// CPU provided by the tier.
    pub cpu: u64,

    /// Memory provided by the tier.
    pub memory: u64,
}

/// An ordered list of supported resource tiers.
///
/// Tiers should be listed from smallest to largest: snapping picks the first tier that fits, in the order given.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TierTable {
    tiers: Vec<ResourceTier>,
}

impl TierTable {
    /// Creates a table from tiers listed smallest first.
    pub fn new(tiers: Vec<ResourceTier>) -> Self {
        Self { tiers }
    }

    /// Returns `true` if the table has no tiers, in which case no snapping takes place.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Returns the first tier that dominates `amounts` on both CPU and memory, if any.
    pub fn snap(&self, amounts: &ResourceAmounts) -> Option<&ResourceTier> {
        self.tiers.iter().find(|tier| amounts.fits_within(tier))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn tier(cpu: u64, memory: u64) -> ResourceTier {
        ResourceTier { name: None, cpu, memory }
    }

    fn fargate() -> TierTable {
        TierTable::new(vec![
            tier(256, 512),
            tier(256, 1024),
            tier(512, 1024),
            tier(512, 4096),
            tier(1024, 2048),
            tier(1024, 8192),
            tier(2048, 16384),
        ])
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate(1000.9), 1000);
        assert_eq!(truncate(0.2), 0);
        assert_eq!(truncate(-4.0), 0);
        assert_eq!(truncate(f64::NAN), 0);
        assert_eq!(truncate(f64::INFINITY), u64::MAX);
    }

    #[test]
    fn buffer_truncates() {
        assert_eq!(apply_buffer(1000, 20), 1200);
        assert_eq!(apply_buffer(999, 15), 1148);
        assert_eq!(apply_buffer(7, 10), 7);
        assert_eq!(apply_buffer(1000, 0), 1000);
        assert_eq!(apply_buffer(u64::MAX, 50), u64::MAX);
    }

    #[test]
    fn unit_conversion() {
        let mb_to_bytes = UnitConversion {
            cpu_factor: 1,
            memory_factor: 1024 * 1024,
        };
        let converted = mb_to_bytes.convert(ResourceAmounts { cpu: 256, memory: 512 });

        assert_eq!(converted, ResourceAmounts { cpu: 256, memory: 536_870_912 });
        assert_eq!(
            UnitConversion::default().convert(ResourceAmounts { cpu: 3, memory: 4 }),
            ResourceAmounts { cpu: 3, memory: 4 }
        );
    }

    #[test]
    fn snap_to_first_dominating_tier() {
        let table = fargate();

        let snapped = table.snap(&ResourceAmounts { cpu: 300, memory: 900 });
        assert_eq!(snapped, Some(&tier(512, 1024)));

        let snapped = table.snap(&ResourceAmounts { cpu: 100, memory: 3000 });
        assert_eq!(snapped, Some(&tier(512, 4096)));

        let snapped = table.snap(&ResourceAmounts { cpu: 256, memory: 512 });
        assert_eq!(snapped, Some(&tier(256, 512)));
    }

    #[test]
    fn snap_without_dominating_tier() {
        assert_eq!(fargate().snap(&ResourceAmounts { cpu: 4096, memory: 512 }), None);
        assert_eq!(TierTable::default().snap(&ResourceAmounts::default()), None);
    }

    proptest! {
        #[test]
        fn property_test_buffer_never_shrinks(amount in 0u64..1_000_000_000, buffer in 0u32..500) {
            let buffered = apply_buffer(amount, buffer);
            assert!(buffered >= amount);
            assert!(buffered <= amount + amount * u64::from(buffer) / 100 + 1);
        }

        #[test]
        fn property_test_snapped_tier_dominates(cpu in 0u64..3000, memory in 0u64..20000) {
            let amounts = ResourceAmounts { cpu, memory };
            if let Some(tier) = fargate().snap(&amounts) {
                assert!(tier.cpu >= cpu && tier.memory >= memory);
            }
        }
    }
}
