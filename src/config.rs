// Copyright 2018-2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! Client configuration, with defaults matching a stock Motive install.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use url::Url;

use crate::{
    buffer_unbuffer::constants::DEFAULT_RECEIVE_BUFFER_SIZE,
    data_types::constants::{DEFAULT_COMMAND_PORT, DEFAULT_DATA_PORT, DEFAULT_MULTICAST_GROUP},
};

/// How the server delivers data frames.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ConnectionType {
    Multicast,
    Unicast,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not parse address {address}: {source}")]
    Url {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("scheme of address {0} not supported, expected natnet://")]
    Scheme(String),
    #[error("could not resolve address {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("address {0} has no IPv4 host")]
    NoIpv4Address(String),
    #[error("invalid value {value:?} for option {key}")]
    InvalidValue { key: String, value: String },
    #[error("unknown option {0}")]
    UnknownOption(String),
}

/// Everything needed to reach a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: Ipv4Addr,
    /// Local interface to receive data on.
    pub local: Ipv4Addr,
    pub command_port: u16,
    pub data_port: u16,
    pub connection: ConnectionType,
    pub multicast_group: Ipv4Addr,
    pub receive_buffer_size: usize,
    /// Longest a single receive blocks before the stream loop checks in.
    pub poll_interval: Duration,
    /// Longest `disconnect` waits for the stream thread to exit.
    pub stop_timeout: Duration,
    /// Longest a version query waits for its answer.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server: Ipv4Addr::LOCALHOST,
            local: Ipv4Addr::LOCALHOST,
            command_port: DEFAULT_COMMAND_PORT,
            data_port: DEFAULT_DATA_PORT,
            connection: ConnectionType::Multicast,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            poll_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Defaults, talking to the given server.
    pub fn new(server: Ipv4Addr) -> ClientConfig {
        ClientConfig {
            server,
            ..Default::default()
        }
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.server, self.command_port))
    }
}

const SCHEME: &str = "natnet";

/// Makes sure there's a scheme followed by ://
fn normalize_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("{}://{}", SCHEME, address)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_value(key, value).map(Duration::from_millis)
}

/// Parses `natnet://server[:command_port][?option&...]`.
///
/// Options: `local=`, `data_port=`, `multicast=` (group address),
/// `unicast`, `buffer=`, and `poll_ms=`, `stop_ms=`, `request_ms=`.
///
/// ```
/// use natnet::{ClientConfig, ConnectionType};
/// let config: ClientConfig = "natnet://10.0.0.5?local=10.0.0.2&unicast".parse().unwrap();
/// assert_eq!(config.server, std::net::Ipv4Addr::new(10, 0, 0, 5));
/// assert_eq!(config.command_port, 1510);
/// assert_eq!(config.connection, ConnectionType::Unicast);
/// ```
impl FromStr for ClientConfig {
    type Err = ConfigError;
    fn from_str(address: &str) -> Result<ClientConfig, ConfigError> {
        let normalized = normalize_scheme(address.trim());
        let parsed = Url::parse(&normalized).map_err(|source| ConfigError::Url {
            address: address.to_string(),
            source,
        })?;
        if parsed.scheme() != SCHEME {
            return Err(ConfigError::Scheme(address.to_string()));
        }

        let socket_addr = parsed
            .socket_addrs(|| Some(DEFAULT_COMMAND_PORT))
            .map_err(|source| ConfigError::Resolve {
                address: address.to_string(),
                source,
            })?
            .into_iter()
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| ConfigError::NoIpv4Address(address.to_string()))?;

        let mut config = ClientConfig::default();
        if let IpAddr::V4(server) = socket_addr.ip() {
            config.server = server;
        }
        config.command_port = socket_addr.port();

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "local" => config.local = parse_value(&key, &value)?,
                "data_port" => config.data_port = parse_value(&key, &value)?,
                "multicast" => {
                    config.connection = ConnectionType::Multicast;
                    if !value.is_empty() {
                        config.multicast_group = parse_value(&key, &value)?;
                    }
                }
                "unicast" => config.connection = ConnectionType::Unicast,
                "buffer" => config.receive_buffer_size = parse_value(&key, &value)?,
                "poll_ms" => config.poll_interval = parse_millis(&key, &value)?,
                "stop_ms" => config.stop_timeout = parse_millis(&key, &value)?,
                "request_ms" => config.request_timeout = parse_millis(&key, &value)?,
                _ => return Err(ConfigError::UnknownOption(key.into_owned())),
            }
        }
        Ok(config)
    }
}
