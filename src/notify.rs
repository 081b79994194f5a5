use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{SiteId, VisitEvent};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for visit events per site. Delivery to customers happens
/// downstream of the subscribers.
pub struct NotifyHub {
    channels: DashMap<SiteId, broadcast::Sender<VisitEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a site. Creates the channel if needed.
    pub fn subscribe(&self, site: SiteId) -> broadcast::Receiver<VisitEvent> {
        let sender = self
            .channels
            .entry(site)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, site: SiteId, event: &VisitEvent) {
        if let Some(sender) = self.channels.get(&site) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a site's channel; existing receivers see the channel close.
    pub fn remove(&self, site: &SiteId) {
        self.channels.remove(site);
    }
}
