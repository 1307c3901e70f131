#![forbid(unsafe_code)]

//! The bilge monitor: three one-wire temperature probes sharing one bus,
//! each calibrated and published, plus an ultrasonic level chain
//! (pulse width → centimetres → moving average → telemetry), plus the
//! device's own uptime and address when `system.sensors` asks for them.
//!
//! # Configuration paths
//!
//! | Path | Component |
//! |------|-----------|
//! | `{prefix}/oneWire` | probe read delay |
//! | `{prefix}/linear` | probe calibration |
//! | `level.input_config_path` | ranger read delay |
//! | `level.linear_config_path` | pulse-width conversion |
//! | `level.average_config_path` | level smoothing |

use sensflow_runtime::{Emits, Linear, MovingAverage, Pipeline, Producer, SystemSensors, TelemetryOutput};
use web_time::Duration;

use crate::netinfo::address_source;
use crate::settings::Settings;
use crate::sim::{OneWireBus, SharedBus, UltrasonicRanger};

/// One temperature probe's chain.
#[derive(Debug)]
pub struct ProbeChain {
    pub name: String,
    pub producer: Producer<f64>,
    pub calibration: Linear,
    pub output: TelemetryOutput<f64>,
}

#[derive(Debug)]
pub struct LevelChain {
    pub producer: Producer<f64>,
    pub distance: Linear,
    pub average: MovingAverage,
    pub output: TelemetryOutput<f64>,
}

/// Handles to everything [`build`] wired.
#[derive(Debug)]
pub struct BilgeMonitor {
    pub bus: SharedBus,
    pub probes: Vec<ProbeChain>,
    pub level: LevelChain,
    pub system: SystemSensors,
}

impl BilgeMonitor {
    /// Failed reads across every producer.
    #[must_use]
    pub fn fault_count(&self) -> u64 {
        self.probes.iter().map(|p| p.producer.fault_count()).sum::<u64>()
            + self.level.producer.fault_count()
            + self.system.fault_count()
    }

    /// Samples handed to the transport across every output.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.probes.iter().map(|p| p.output.published()).sum::<u64>() + self.level.output.published()
    }
}

/// Wire the bilge monitor into `pipeline`. Call before [`Pipeline::start`].
pub fn build(pipeline: &Pipeline, settings: &Settings) -> BilgeMonitor {
    let read_delay = Duration::from_millis(settings.read_delay_ms);
    let sim = &settings.simulation;
    let bus = OneWireBus::new(pipeline.clock().clone(), sim.fault_every).shared();

    let probes = settings
        .probes
        .iter()
        .map(|probe| {
            let address = bus.borrow_mut().attach(probe.base_kelvin);
            let reader = SharedBus::clone(&bus);
            let producer = Producer::new(
                pipeline,
                format!("{}-probe", probe.name),
                move || reader.borrow_mut().read_kelvin(address),
                read_delay,
                Some(format!("{}/oneWire", probe.config_prefix).as_str()),
            );
            let calibration = Linear::new(pipeline, 1.0, 0.0, Some(format!("{}/linear", probe.config_prefix).as_str()));
            let output = TelemetryOutput::new(pipeline, probe.telemetry_path.as_str());
            producer.connect_to(calibration.clone()).connect_to(output.clone());
            ProbeChain {
                name: probe.name.clone(),
                producer,
                calibration,
                output,
            }
        })
        .collect();

    let level = &settings.level;
    let mut ranger = UltrasonicRanger::new(
        pipeline.clock().clone(),
        Duration::from_millis(sim.echo_delay_ms),
        sim.bilge_depth_cm,
    );
    // Collect the echo as soon as it is due, not a whole read delay later.
    let producer = Producer::new(
        pipeline,
        "ultrasonic",
        move || ranger.poll(),
        read_delay,
        Some(level.input_config_path.as_str()),
    )
    .with_pending_poll(Duration::from_millis(sim.echo_delay_ms));
    let distance = Linear::new(pipeline, level.multiplier, level.offset, Some(level.linear_config_path.as_str()));
    let average = MovingAverage::new(pipeline, level.window, level.scale, Some(level.average_config_path.as_str()));
    let output = TelemetryOutput::new(pipeline, level.telemetry_path.as_str());
    producer
        .connect_to(distance.clone())
        .connect_to(average.clone())
        .connect_to(output.clone());

    let system = SystemSensors::install(
        pipeline,
        settings.system.sensors,
        Duration::from_millis(settings.system.read_delay_ms),
        address_source(&settings.system),
    );

    tracing::debug!(probes = settings.probes.len(), system = ?settings.system.sensors, "bilge monitor wired");
    BilgeMonitor {
        bus,
        probes,
        level: LevelChain {
            producer,
            distance,
            average,
            output,
        },
        system,
    }
}
