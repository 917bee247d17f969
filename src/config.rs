use std::net::{IpAddr, Ipv4Addr};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the UDP socket to
    pub bind_address: IpAddr,
    /// UDP port to listen on
    pub udp_port: u16,
    /// Number of tanks created at startup; the hard cap on concurrent players
    pub pool_size: usize,
    /// Players per session
    pub session_capacity: usize,
    /// Command queue bridge address (host:port); queue feed disabled when unset
    pub command_queue_addr: Option<String>,
    /// Matchmaking event feed address (host:port); feed disabled when unset
    pub matchmaking_queue_addr: Option<String>,
    /// Event collector address (host:port); events only go to the log when unset
    pub event_sink_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            udp_port: 9999,
            pool_size: 100,
            session_capacity: 2,
            command_queue_addr: None,
            matchmaking_queue_addr: None,
            event_sink_addr: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("UDP_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.udp_port = parsed;
                } else {
                    tracing::warn!("UDP_PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid UDP_PORT '{}', using default", port);
            }
        }

        if let Ok(pool_size) = std::env::var("TANK_POOL_SIZE") {
            if let Ok(parsed) = pool_size.parse::<usize>() {
                if parsed > 0 && parsed <= 10000 {
                    config.pool_size = parsed;
                } else {
                    tracing::warn!("TANK_POOL_SIZE must be 1-10000, using default");
                }
            } else {
                tracing::warn!("Invalid TANK_POOL_SIZE '{}', using default", pool_size);
            }
        }

        if let Ok(capacity) = std::env::var("SESSION_CAPACITY") {
            if let Ok(parsed) = capacity.parse::<usize>() {
                if parsed > 0 && parsed <= 100 {
                    config.session_capacity = parsed;
                } else {
                    tracing::warn!("SESSION_CAPACITY must be 1-100, using default");
                }
            } else {
                tracing::warn!("Invalid SESSION_CAPACITY '{}', using default", capacity);
            }
        }

        if let Ok(queue_addr) = std::env::var("COMMAND_QUEUE_ADDR") {
            if !queue_addr.is_empty() {
                config.command_queue_addr = Some(queue_addr);
            }
        }

        if let Ok(matchmaking_addr) = std::env::var("MATCHMAKING_QUEUE_ADDR") {
            if !matchmaking_addr.is_empty() {
                config.matchmaking_queue_addr = Some(matchmaking_addr);
            }
        }

        if let Ok(sink_addr) = std::env::var("EVENT_SINK_ADDR") {
            if !sink_addr.is_empty() {
                config.event_sink_addr = Some(sink_addr);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.udp_port == 0 {
            return Err("UDP port cannot be 0".to_string());
        }
        if self.pool_size == 0 {
            return Err("pool_size must be at least 1".to_string());
        }
        if self.session_capacity == 0 {
            return Err("session_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.udp_port, 9999);
        assert_eq!(config.pool_size, 100);
        assert_eq!(config.session_capacity, 2);
        assert!(config.command_queue_addr.is_none());
        assert!(config.matchmaking_queue_addr.is_none());
        assert!(config.event_sink_addr.is_none());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.udp_port > 0);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = ServerConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.session_capacity = 0;
        assert!(config.validate().is_err());

        assert!(ServerConfig::default().validate().is_ok());
    }
}
