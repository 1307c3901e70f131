#![forbid(unsafe_code)]

//! Built-in device telemetry: how long the pipeline has been up and which
//! network address it is reachable at, published under
//! `sensorDevice.{hostname}.*`.
//!
//! The address lookup is supplied by the host as a [`ReadInput`]; a failed
//! lookup is an ordinary read fault and the next read tries again.

use std::fmt;

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::consumer::TelemetryOutput;
use crate::error::ReadError;
use crate::pipeline::Pipeline;
use crate::producer::{Producer, ReadInput};
use crate::reactive::Emits;

/// Root of every device telemetry path.
pub const DEVICE_PATH_ROOT: &str = "sensorDevice";

/// Which device sensors to install. Each level includes the ones before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemSensorLevel {
    None,
    Uptime,
    #[default]
    IpAddress,
}

/// `sensorDevice.{hostname}.{leaf}`
#[must_use]
pub fn device_path(hostname: &str, leaf: &str) -> String {
    format!("{DEVICE_PATH_ROOT}.{hostname}.{leaf}")
}

/// Handles to the installed device sensors.
#[derive(Default)]
pub struct SystemSensors {
    pub uptime: Option<Producer<f64>>,
    pub ip_address: Option<Producer<String>>,
}

impl fmt::Debug for SystemSensors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSensors")
            .field("uptime", &self.uptime.as_ref().map(Producer::label))
            .field("ip_address", &self.ip_address.as_ref().map(Producer::label))
            .finish()
    }
}

impl SystemSensors {
    /// Install the sensors `level` asks for, each read every `read_delay`.
    /// Uptime is published in seconds.
    pub fn install(
        pipeline: &Pipeline,
        level: SystemSensorLevel,
        read_delay: Duration,
        address: impl ReadInput<String> + 'static,
    ) -> Self {
        let hostname = pipeline.hostname().to_owned();
        let mut sensors = Self::default();

        if level >= SystemSensorLevel::Uptime {
            let clock = pipeline.clock().clone();
            let uptime = Producer::new(
                pipeline,
                "system-uptime",
                move || -> Result<f64, ReadError> { Ok(clock.now().as_secs_f64()) },
                read_delay,
                None,
            );
            uptime.connect_to(TelemetryOutput::new(pipeline, device_path(&hostname, "uptime")));
            sensors.uptime = Some(uptime);
        }

        if level >= SystemSensorLevel::IpAddress {
            let ip = Producer::new(pipeline, "system-ip-address", address, read_delay, None);
            ip.connect_to(TelemetryOutput::new(pipeline, device_path(&hostname, "ipAddress")));
            sensors.ip_address = Some(ip);
        }

        tracing::debug!(?level, hostname = %hostname, "system sensors installed");
        sensors
    }

    /// Failed address lookups so far.
    #[must_use]
    pub fn fault_count(&self) -> u64 {
        self.ip_address.as_ref().map_or(0, Producer::fault_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RecordingTransport, TelemetryValue};
    use sensflow_core::clock::{Clock, LabClock};
    use sensflow_core::diagnostics::{RecordingDiagnostics, Severity};

    fn rig() -> (LabClock, RecordingTransport, RecordingDiagnostics, Pipeline) {
        let lab = LabClock::new();
        let transport = RecordingTransport::new();
        let diagnostics = RecordingDiagnostics::new();
        let pipeline = Pipeline::builder()
            .hostname("bilge-temp-monitor")
            .clock(Clock::lab(&lab))
            .diagnostics(diagnostics.clone())
            .transport(transport.clone())
            .build();
        (lab, transport, diagnostics, pipeline)
    }

    fn fixed_address() -> impl FnMut() -> Result<String, ReadError> {
        || Ok("192.168.0.50".to_owned())
    }

    #[test]
    fn ip_level_publishes_uptime_and_address_under_hostname() {
        let (lab, transport, _diag, pipeline) = rig();
        let sensors = SystemSensors::install(
            &pipeline,
            SystemSensorLevel::IpAddress,
            Duration::from_secs(10),
            fixed_address(),
        );
        pipeline.start().expect("start");

        pipeline.run_once();
        lab.advance_to(Duration::from_secs(10));
        pipeline.run_once();

        let uptime = transport.values_for("sensorDevice.bilge-temp-monitor.uptime");
        assert_eq!(uptime, vec![TelemetryValue::Number(0.0), TelemetryValue::Number(10.0)]);
        let address = transport.values_for("sensorDevice.bilge-temp-monitor.ipAddress");
        assert_eq!(address.len(), 2);
        assert_eq!(address[0], TelemetryValue::Text("192.168.0.50".to_owned()));
        assert_eq!(sensors.fault_count(), 0);
    }

    #[test]
    fn uptime_level_skips_the_address_lookup() {
        let (_lab, transport, _diag, pipeline) = rig();
        let sensors = SystemSensors::install(
            &pipeline,
            SystemSensorLevel::Uptime,
            Duration::from_secs(1),
            || -> Result<String, ReadError> { Err(ReadError::other("must not be read")) },
        );
        pipeline.start().expect("start");
        pipeline.run_once();

        assert!(sensors.ip_address.is_none());
        assert_eq!(transport.values_for("sensorDevice.bilge-temp-monitor.uptime").len(), 1);
        assert_eq!(pipeline.node_count(), 2);
    }

    #[test]
    fn none_level_installs_nothing() {
        let (_lab, _transport, _diag, pipeline) = rig();
        let sensors =
            SystemSensors::install(&pipeline, SystemSensorLevel::None, Duration::from_secs(1), fixed_address());
        assert!(sensors.uptime.is_none());
        assert!(sensors.ip_address.is_none());
        assert_eq!(pipeline.node_count(), 0);
    }

    #[test]
    fn failed_lookup_is_reported_and_retried() {
        let (lab, transport, diag, pipeline) = rig();
        let mut lookups = 0;
        let sensors = SystemSensors::install(
            &pipeline,
            SystemSensorLevel::IpAddress,
            Duration::from_secs(1),
            move || {
                lookups += 1;
                if lookups == 1 {
                    Err(ReadError::Disconnected("network unreachable".to_owned()))
                } else {
                    Ok("10.0.0.7".to_owned())
                }
            },
        );
        pipeline.start().expect("start");

        pipeline.run_once();
        lab.advance_to(Duration::from_secs(1));
        pipeline.run_once();

        assert_eq!(sensors.fault_count(), 1);
        assert_eq!(diag.count_at_least(Severity::Warning), 1);
        assert_eq!(
            transport.values_for("sensorDevice.bilge-temp-monitor.ipAddress"),
            vec![TelemetryValue::Text("10.0.0.7".to_owned())]
        );
    }

    #[test]
    fn level_names_round_through_settings_json() {
        let level: SystemSensorLevel = serde_json::from_str("\"ip_address\"").expect("known level");
        assert_eq!(level, SystemSensorLevel::IpAddress);
        assert_eq!(SystemSensorLevel::default(), SystemSensorLevel::IpAddress);
    }
}
