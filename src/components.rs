use crate::gateway::Rssi;
use crate::summary::Summary;
use std::sync::mpsc::Sender;

/// Inbound seam: anything that accepts `(gateway_id, reading)` events.
pub trait ReadingSink {
    fn record(&self, gateway_id: &str, reading: Option<Rssi>);
}

/// Outbound seam: receives one summary per rotation.
pub trait SummarySink: Send + 'static {
    /// Returns `false` once the sink can no longer accept summaries.
    fn emit(&mut self, summary: Summary) -> bool;
}

impl<F> SummarySink for F
where
    F: FnMut(Summary) + Send + 'static,
{
    #[inline(always)]
    fn emit(&mut self, summary: Summary) -> bool {
        (self)(summary);
        true
    }
}

/// Forwards summaries into a channel.
pub struct ChannelSink(pub Sender<Summary>);

impl SummarySink for ChannelSink {
    fn emit(&mut self, summary: Summary) -> bool {
        self.0.send(summary).is_ok()
    }
}

impl From<Sender<Summary>> for ChannelSink {
    fn from(sender: Sender<Summary>) -> Self {
        Self(sender)
    }
}
