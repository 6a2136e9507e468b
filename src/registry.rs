//! The set of devices the simulated controller currently announces.

use std::fmt;

use crate::error::SimError;

/// A (type, name) pair. The pair itself is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    pub kind: String,
    pub name: String,
}

impl Device {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Enabled devices in insertion order, which is also Hello order.
///
/// Duplicates are kept: enabling the same pair twice announces it twice and
/// needs two disables to remove.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Removes the first exact match.
    pub fn disable(&mut self, device: &Device) -> Result<Device, SimError> {
        let index = self
            .devices
            .iter()
            .position(|d| d == device)
            .ok_or_else(|| SimError::NotFound {
                kind: device.kind.clone(),
                name: device.name.clone(),
            })?;
        Ok(self.devices.remove(index))
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_keeps_insertion_order() {
        let mut registry = DeviceRegistry::new();
        registry.enable(Device::new("light", "L1"));
        registry.enable(Device::new("sst", "S1"));
        registry.enable(Device::new("drer", "D1"));
        assert_eq!(
            registry.devices(),
            &[
                Device::new("light", "L1"),
                Device::new("sst", "S1"),
                Device::new("drer", "D1"),
            ]
        );
    }

    #[test]
    fn disable_removes_first_match_only() {
        let mut registry = DeviceRegistry::new();
        registry.enable(Device::new("light", "L1"));
        registry.enable(Device::new("sst", "S1"));
        registry.enable(Device::new("light", "L1"));

        registry.disable(&Device::new("light", "L1")).unwrap();
        assert_eq!(
            registry.devices(),
            &[Device::new("sst", "S1"), Device::new("light", "L1")]
        );
    }

    #[test]
    fn disable_absent_device_is_not_found() {
        let mut registry = DeviceRegistry::new();
        registry.enable(Device::new("light", "L1"));

        let err = registry.disable(&Device::new("light", "L2")).unwrap_err();
        assert!(matches!(err, SimError::NotFound { ref name, .. } if name == "L2"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn replay_matches_multiset() {
        let mut registry = DeviceRegistry::new();
        let ops: &[(bool, &str)] = &[
            (true, "A"),
            (true, "B"),
            (true, "A"),
            (false, "A"),
            (true, "C"),
            (false, "B"),
        ];
        for &(enable, name) in ops {
            let device = Device::new("load", name);
            if enable {
                registry.enable(device);
            } else {
                registry.disable(&device).unwrap();
            }
        }
        let mut names: Vec<_> = registry.devices().iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn device_display_matches_hello_line() {
        assert_eq!(Device::new("light", "L1").to_string(), "light L1");
    }
}
