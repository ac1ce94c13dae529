use beacon_window::{ReadingSink, Rssi};
use std::thread;
use std::time::{Duration, Instant};

/// Produces beacon sightings the way a handful of gateways on site would.
pub struct GatewaySimulator {
    gateways: Vec<String>,
    state: u64,
}

impl GatewaySimulator {
    /// A gateway that publishes on the same topic but is not on the allow-list.
    pub const ROGUE_GATEWAY: &'static str = "94A408B0FFFF";

    pub fn new(gateways: Vec<String>, seed: u64) -> Self {
        Self {
            gateways,
            state: seed.max(1),
        }
    }

    // xorshift64
    fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// One sighting: a gateway and an RSSI between -100 and -30 dBm,
    /// or no reading when the beacon payload was empty.
    pub fn sighting(&mut self) -> (&str, Option<Rssi>) {
        let gateway = (self.next() % self.gateways.len() as u64) as usize;
        let roll = self.next();
        let reading = if roll % 9 == 0 {
            None
        } else {
            Some(-30 - (roll % 71) as Rssi)
        };
        (&self.gateways[gateway], reading)
    }

    /// Feeds sightings into `sink` until `deadline`; returns how many were sent.
    pub fn run_until(&mut self, sink: &impl ReadingSink, deadline: Instant) -> u64 {
        let mut sent = 0;
        while Instant::now() < deadline {
            let (gateway, reading) = self.sighting();
            sink.record(gateway, reading);
            sent += 1;
            thread::sleep(Duration::from_millis(10));
        }
        sent
    }
}
