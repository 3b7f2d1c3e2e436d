use serde::{Deserialize, Serialize};

/// One accelerator-class device found while enumerating the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorDevice {
    pub name: String,
    pub utilization: Option<f64>,
}

impl AcceleratorDevice {
    pub fn new(name: impl Into<String>, utilization: Option<f64>) -> Self {
        AcceleratorDevice {
            name: name.into(),
            utilization,
        }
    }
}

/// Utilization of the first device, in enumeration order, that reports one.
///
/// First match wins: later devices are neither consulted nor averaged in.
/// Non-finite values do not count as a report.
pub fn first_utilization<I>(devices: I) -> Option<f64>
where
    I: IntoIterator<Item = AcceleratorDevice>,
{
    devices
        .into_iter()
        .find_map(|device| device.utilization.filter(|value| value.is_finite()))
}

/// Whole watts from milliwatts. Truncates toward zero.
pub fn milliwatts_to_watts(milliwatts: i64) -> i64 {
    milliwatts / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reporting_device_wins() {
        let devices = vec![
            AcceleratorDevice::new("display", None),
            AcceleratorDevice::new("AGXAcceleratorG14X", Some(37.0)),
            AcceleratorDevice::new("eGPU", Some(90.0)),
        ];
        assert_eq!(first_utilization(devices), Some(37.0));
    }

    #[test]
    fn stops_at_first_match() {
        let mut visited = 0;
        let devices = (0..10).map(|i| {
            visited += 1;
            AcceleratorDevice::new(format!("dev{i}"), (i == 2).then_some(12.0))
        });
        assert_eq!(first_utilization(devices), Some(12.0));
        assert_eq!(visited, 3);
    }

    #[test]
    fn no_device_or_field_is_unavailable() {
        assert_eq!(first_utilization(Vec::new()), None);
        assert_eq!(
            first_utilization(vec![
                AcceleratorDevice::new("a", None),
                AcceleratorDevice::new("b", Some(f64::NAN)),
            ]),
            None
        );
    }

    #[test]
    fn milliwatts_truncate() {
        assert_eq!(milliwatts_to_watts(12_999), 12);
        assert_eq!(milliwatts_to_watts(999), 0);
        assert_eq!(milliwatts_to_watts(0), 0);
        assert_eq!(milliwatts_to_watts(-1_500), -1);
    }
}
