//! The envelope that crosses the collector -> sender boundary.

use crate::metrics::{
    ContainerMetric, CpuMetric, DiskIoMetric, DiskMetric, HostInfoMetric, Metric, MemoryMetric,
    NetworkMetric, ProcessMetric, ServiceMetric, SystemMetric, TemperatureMetric, UpdatesMetric,
    WifiMetric,
};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One metric sample, addressed to the ingest endpoint.
///
/// Wire shape: `{ "type": <tag>, "timestamp": <rfc3339>, "hostname":
/// <string>, "data": <object> }`. `type` is redundant with the shape of
/// `data` but lets the server route without fully parsing the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub data: Metric,
}

impl Envelope {
    pub fn new(hostname: impl Into<String>, timestamp: DateTime<Utc>, data: Metric) -> Self {
        Self { timestamp, hostname: hostname.into(), data }
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Envelope", 4)?;
        state.serialize_field("type", self.data.type_tag())?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("hostname", &self.hostname)?;
        match &self.data {
            Metric::Cpu(m) => state.serialize_field("data", m)?,
            Metric::Memory(m) => state.serialize_field("data", m)?,
            Metric::Disk(m) => state.serialize_field("data", m)?,
            Metric::DiskIo(m) => state.serialize_field("data", m)?,
            Metric::Network(m) => state.serialize_field("data", m)?,
            Metric::Process(m) => state.serialize_field("data", m)?,
            Metric::Service(m) => state.serialize_field("data", m)?,
            Metric::Temperature(m) => state.serialize_field("data", m)?,
            Metric::Wifi(m) => state.serialize_field("data", m)?,
            Metric::Container(m) => state.serialize_field("data", m)?,
            Metric::System(m) => state.serialize_field("data", m)?,
            Metric::Updates(m) => state.serialize_field("data", m)?,
            Metric::HostInfo(m) => state.serialize_field("data", m)?,
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EnvelopeVisitor;

        impl<'de> Visitor<'de> for EnvelopeVisitor {
            type Value = Envelope;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an envelope object with type/timestamp/hostname/data")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Envelope, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut type_tag: Option<String> = None;
                let mut timestamp: Option<DateTime<Utc>> = None;
                let mut hostname: Option<String> = None;
                let mut raw_data: Option<serde_json::Value> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "type" => type_tag = Some(map.next_value()?),
                        "timestamp" => timestamp = Some(map.next_value()?),
                        "hostname" => hostname = Some(map.next_value()?),
                        "data" => raw_data = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde_json::Value>()?;
                        }
                    }
                }

                let type_tag = type_tag.ok_or_else(|| de::Error::missing_field("type"))?;
                let timestamp = timestamp.ok_or_else(|| de::Error::missing_field("timestamp"))?;
                let hostname = hostname.ok_or_else(|| de::Error::missing_field("hostname"))?;
                let raw_data = raw_data.ok_or_else(|| de::Error::missing_field("data"))?;

                let data = decode_metric(&type_tag, raw_data).map_err(de::Error::custom)?;

                Ok(Envelope { timestamp, hostname, data })
            }
        }

        deserializer.deserialize_map(EnvelopeVisitor)
    }
}

fn decode_metric(tag: &str, value: serde_json::Value) -> Result<Metric, serde_json::Error> {
    Ok(match tag {
        "cpu" => Metric::Cpu(serde_json::from_value::<CpuMetric>(value)?),
        "memory" => Metric::Memory(serde_json::from_value::<MemoryMetric>(value)?),
        "disk" => Metric::Disk(serde_json::from_value::<DiskMetric>(value)?),
        "disk_io" => Metric::DiskIo(serde_json::from_value::<DiskIoMetric>(value)?),
        "network" => Metric::Network(serde_json::from_value::<NetworkMetric>(value)?),
        "process" => Metric::Process(serde_json::from_value::<ProcessMetric>(value)?),
        "service" => Metric::Service(serde_json::from_value::<ServiceMetric>(value)?),
        "temperature" => Metric::Temperature(serde_json::from_value::<TemperatureMetric>(value)?),
        "wifi" => Metric::Wifi(serde_json::from_value::<WifiMetric>(value)?),
        "container" => Metric::Container(serde_json::from_value::<ContainerMetric>(value)?),
        "system" => Metric::System(serde_json::from_value::<SystemMetric>(value)?),
        "updates" => Metric::Updates(serde_json::from_value::<UpdatesMetric>(value)?),
        "host_info" => Metric::HostInfo(serde_json::from_value::<HostInfoMetric>(value)?),
        other => {
            return Err(de::Error::custom(format!("unknown envelope type tag: {other}")));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DiskCategory, SystemMetric};

    #[test]
    fn round_trips_system_metric() {
        let env = Envelope::new(
            "host-1",
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            Metric::System(SystemMetric {
                uptime_seconds: 120,
                boot_time_unix: 1_700_000_000,
                process_count: 42,
                logged_in_users: 1,
            }),
        );

        let json = serde_json::to_string(&env).unwrap();
        let parsed: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn round_trips_disk_metric() {
        let env = Envelope::new(
            "host-1",
            Utc::now(),
            Metric::Disk(crate::metrics::DiskMetric {
                device: "sda1".into(),
                mountpoint: "/".into(),
                fs_type: "ext4".into(),
                category: DiskCategory::Local,
                total_bytes: 1000,
                used_bytes: 400,
                available_bytes: 600,
                used_percent: 40.0,
                inodes_total: 10,
                inodes_used: 1,
                inodes_used_percent: 10.0,
            }),
        );

        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"disk\""));
        let parsed: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn unknown_type_tag_fails() {
        let json = r#"{"type":"bogus","timestamp":"2026-01-01T00:00:00Z","hostname":"h","data":{}}"#;
        let result: Result<Envelope, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
