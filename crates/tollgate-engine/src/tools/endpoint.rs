use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Dev-server ports probed when no URL is configured, in order.
pub const DEFAULT_PORTS: [u16; 5] = [3000, 5173, 8080, 4200, 8000];

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Where the performance gate points the profiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A configured URL, used as is.
    Fixed(String),
    /// First port on `host` that accepts a TCP connection.
    Probe { host: String, ports: Vec<u16> },
}

impl Endpoint {
    pub fn localhost() -> Self {
        Endpoint::Probe {
            host: "localhost".to_string(),
            ports: DEFAULT_PORTS.to_vec(),
        }
    }

    /// Configured URL if any, else the localhost probe.
    pub fn from_config(url: Option<&str>) -> Self {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(u) => Endpoint::Fixed(u.to_string()),
            None => Self::localhost(),
        }
    }

    pub fn resolve(&self) -> Option<String> {
        match self {
            Endpoint::Fixed(url) => Some(url.clone()),
            Endpoint::Probe { host, ports } => ports
                .iter()
                .find(|&&port| accepts(host, port))
                .map(|port| format!("http://{host}:{port}")),
        }
    }

    /// What was tried, for "no endpoint" messages.
    pub fn describe(&self) -> String {
        match self {
            Endpoint::Fixed(url) => url.clone(),
            Endpoint::Probe { host, ports } => {
                let ports: Vec<String> = ports.iter().map(u16::to_string).collect();
                format!("nothing listening on {host} ports {}", ports.join(", "))
            }
        }
    }
}

fn accepts(host: &str, port: u16) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(_) => return false,
    };
    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, PROBE_TIMEOUT).is_ok())
}
