//! The set of all channels configured for this server, shared read-only once startup
//! finishes binding sockets.

use std::sync::Arc;

use crate::channel::ChannelServer;

pub struct ChannelRegistry {
    channels: Vec<Arc<ChannelServer>>,
}

impl ChannelRegistry {
    pub fn new(channels: Vec<Arc<ChannelServer>>) -> Self {
        ChannelRegistry { channels }
    }

    pub fn find(&self, name: &str) -> Option<Arc<ChannelServer>> {
        self.channels.iter().find(|c| c.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChannelServer>> {
        self.channels.iter()
    }
}
