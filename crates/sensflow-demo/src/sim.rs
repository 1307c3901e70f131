#![forbid(unsafe_code)]

//! Simulated hardware: a shared one-wire bus with temperature probes and an
//! ultrasonic ranger whose echo arrives some milliseconds after the trigger.
//!
//! Readings are deterministic functions of clock uptime so lab-clock runs
//! are reproducible.

use std::cell::RefCell;
use std::f64::consts::TAU;
use std::rc::Rc;

use sensflow_core::Clock;
use sensflow_runtime::ReadError;
use web_time::Duration;

/// Conversion time of a one-wire temperature read.
pub const CONVERSION_TIME: Duration = Duration::from_millis(750);

/// Microseconds of echo per centimetre of range (out and back).
pub const ECHO_US_PER_CM: f64 = 58.0;

/// Index of a probe on its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress(usize);

#[derive(Debug)]
struct SimProbe {
    base_kelvin: f64,
    phase: f64,
}

/// One-wire bus shared by several probes. Each read is one bus
/// transaction; callers hold the borrow for its whole duration.
#[derive(Debug)]
pub struct OneWireBus {
    clock: Clock,
    probes: Vec<SimProbe>,
    transactions: u64,
    fault_every: u32,
}

pub type SharedBus = Rc<RefCell<OneWireBus>>;

impl OneWireBus {
    /// `fault_every = n` makes every nth transaction time out; 0 never.
    #[must_use]
    pub fn new(clock: Clock, fault_every: u32) -> Self {
        Self {
            clock,
            probes: Vec::new(),
            transactions: 0,
            fault_every,
        }
    }

    #[must_use]
    pub fn shared(self) -> SharedBus {
        Rc::new(RefCell::new(self))
    }

    pub fn attach(&mut self, base_kelvin: f64) -> DeviceAddress {
        let address = DeviceAddress(self.probes.len());
        self.probes.push(SimProbe {
            base_kelvin,
            phase: self.probes.len() as f64 * 0.7,
        });
        address
    }

    #[must_use]
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Read one probe, in kelvin.
    pub fn read_kelvin(&mut self, address: DeviceAddress) -> Result<f64, ReadError> {
        self.transactions += 1;
        if self.fault_every > 0 && self.transactions % u64::from(self.fault_every) == 0 {
            return Err(ReadError::Timeout(CONVERSION_TIME));
        }
        let probe = self
            .probes
            .get(address.0)
            .ok_or_else(|| ReadError::Disconnected(format!("no device at address {}", address.0)))?;
        // Slow half-degree swing, ten minutes per cycle.
        let t = self.clock.now().as_secs_f64() / 600.0;
        Ok(probe.base_kelvin + 0.5 * (TAU * t + probe.phase).sin())
    }
}

// ─── Ultrasonic ranger ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum EchoState {
    Idle,
    Waiting { ready_at: Duration },
}

/// Trigger-then-listen range sensor. The first poll triggers a pulse and
/// reports [`ReadError::Pending`]; a poll after the echo delay returns the
/// echo pulse width in microseconds.
#[derive(Debug)]
pub struct UltrasonicRanger {
    clock: Clock,
    echo_delay: Duration,
    depth_cm: f64,
    state: EchoState,
}

impl UltrasonicRanger {
    #[must_use]
    pub fn new(clock: Clock, echo_delay: Duration, depth_cm: f64) -> Self {
        Self {
            clock,
            echo_delay,
            depth_cm,
            state: EchoState::Idle,
        }
    }

    pub fn poll(&mut self) -> Result<f64, ReadError> {
        let now = self.clock.now();
        match self.state {
            EchoState::Idle => {
                self.state = EchoState::Waiting {
                    ready_at: now + self.echo_delay,
                };
                Err(ReadError::Pending)
            }
            EchoState::Waiting { ready_at } if now < ready_at => Err(ReadError::Pending),
            EchoState::Waiting { .. } => {
                self.state = EchoState::Idle;
                // Water sloshing: two centimetres either way, half-minute period.
                let slosh = 2.0 * (TAU * now.as_secs_f64() / 30.0).sin();
                Ok((self.depth_cm + slosh).max(0.0) * ECHO_US_PER_CM)
            }
        }
    }
}
