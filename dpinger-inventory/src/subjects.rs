//! Subject resolver translating logical channels to concrete NATS subjects.
//!
//! No hard-coded subject strings appear in the reconciliation or publishing
//! paths; callers always go through a [`Channel`] and a [`SubjectResolver`].

use dpinger_config::NatsConfig;

/// logical coordination channels used by the bus client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// catalog snapshot / update / sync-request traffic.
    Db,
    /// outbound `ProbeResult` publication.
    Ping,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Db => write!(f, "db"),
            Channel::Ping => write!(f, "ping"),
        }
    }
}

/// pure, stateless translator from logical channel to concrete NATS subject.
#[derive(Debug, Clone)]
pub struct SubjectResolver {
    db_chan: String,
    ping_chan: String,
}

impl SubjectResolver {
    pub fn from_config(config: &NatsConfig) -> Self {
        Self {
            db_chan: config.db_chan.clone(),
            ping_chan: config.ping_chan.clone(),
        }
    }

    pub fn resolve(&self, channel: Channel) -> &str {
        match channel {
            Channel::Db => &self.db_chan,
            Channel::Ping => &self.ping_chan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NatsConfig {
        NatsConfig {
            url: "nats://127.0.0.1:4222".into(),
            db_chan: "dpinger.db".into(),
            ping_chan: "dpinger.ping".into(),
        }
    }

    #[test]
    fn resolves_each_channel() {
        let resolver = SubjectResolver::from_config(&config());
        assert_eq!(resolver.resolve(Channel::Db), "dpinger.db");
        assert_eq!(resolver.resolve(Channel::Ping), "dpinger.ping");
    }

    #[test]
    fn channel_display() {
        assert_eq!(Channel::Db.to_string(), "db");
        assert_eq!(Channel::Ping.to_string(), "ping");
    }
}
