//! `MSAcpi_ThermalZoneTemperature` in the `root\wmi` namespace (§4.3.9).
//! Values are in deci-Kelvin: `celsius = (value - 2732) / 10`.

use serde::Deserialize;
use spectra_types::{Error, Metric, Result, TemperatureMetric};
use wmi::{COMLibrary, WMIConnection};

#[derive(Deserialize, Debug)]
#[serde(rename = "MSAcpi_ThermalZoneTemperature")]
#[serde(rename_all = "PascalCase")]
struct ThermalZoneTemperature {
    instance_name: String,
    current_temperature: u32,
}

pub fn read() -> Result<Vec<Metric>> {
    let com_lib = COMLibrary::new().map_err(|e| Error::Platform(format!("COM init failed: {e}")))?;
    let wmi_con = WMIConnection::with_namespace_path("root\\wmi", com_lib)
        .map_err(|e| Error::Platform(format!("WMI connect to root\\wmi failed: {e}")))?;

    let zones: Vec<ThermalZoneTemperature> = wmi_con
        .query()
        .map_err(|e| Error::Platform(format!("MSAcpi_ThermalZoneTemperature query failed: {e}")))?;

    Ok(zones
        .into_iter()
        .map(|z| {
            let current_celsius = (z.current_temperature as f64 - 2732.0) / 10.0;
            let sensor = z.instance_name.rsplit('\\').next().unwrap_or(&z.instance_name).to_string();
            Metric::Temperature(TemperatureMetric { sensor, current_celsius, max_celsius: None })
        })
        .collect())
}
