//! Metrics sink.
//!
//! [`StatsdClient`] sends each gauge as its own UDP datagram in the plain
//! statsd line format (`name:value|g`). The client is built once at startup
//! and never reconfigured.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a metrics sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot resolve statsd address {address}: {reason}")]
    Resolve { address: String, reason: String },
    #[error("statsd send failed: {0}")]
    Io(#[from] std::io::Error),
    /// The metric cannot be expressed in the line protocol.
    #[error("invalid metric {name:?} = {value:?}: {reason}")]
    InvalidMetric {
        name: String,
        value: String,
        reason: &'static str,
    },
}

/// Destination for gauge samples.
pub trait MetricsSink {
    fn gauge(&self, name: &str, value: &str) -> Result<(), SinkError>;
}

impl<T: MetricsSink + ?Sized> MetricsSink for &T {
    fn gauge(&self, name: &str, value: &str) -> Result<(), SinkError> {
        (**self).gauge(name, value)
    }
}

/// Blocking statsd client over UDP.
#[derive(Debug)]
pub struct StatsdClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl StatsdClient {
    /// Resolves `host:port` and binds a local socket of the matching family.
    pub fn new(host: &str, port: u16, send_timeout: Option<Duration>) -> Result<Self, SinkError> {
        let address = format!("{host}:{port}");
        let target = (host, port)
            .to_socket_addrs()
            .map_err(|e| SinkError::Resolve {
                address: address.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| SinkError::Resolve {
                address: address.clone(),
                reason: "no addresses found".to_string(),
            })?;

        let bind_addr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_write_timeout(send_timeout)?;

        Ok(Self { socket, target })
    }
}

impl MetricsSink for StatsdClient {
    fn gauge(&self, name: &str, value: &str) -> Result<(), SinkError> {
        let payload = format_gauge(name, value)?;
        self.socket.send_to(payload.as_bytes(), self.target)?;
        Ok(())
    }
}

/// Renders a gauge in the statsd line format.
///
/// A leading sign on a gauge value means "adjust" to statsd, so an explicit
/// `+` is dropped and negative values are sent as a reset to zero followed by
/// the negative delta, which lands on the intended absolute value.
pub fn format_gauge(name: &str, value: &str) -> Result<String, SinkError> {
    let invalid = |reason| SinkError::InvalidMetric {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.contains([':', '|', '@', '\n', '\r']) {
        return Err(invalid("name contains a reserved character"));
    }

    let value = value.trim();
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => {}
        _ => return Err(invalid("value is not a finite number")),
    }

    let value = value.strip_prefix('+').unwrap_or(value);
    if value.starts_with('-') {
        Ok(format!("{name}:0|g\n{name}:{value}|g"))
    } else {
        Ok(format!("{name}:{value}|g"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_plain_gauge() {
        assert_eq!(format_gauge("queue.depth", "42").unwrap(), "queue.depth:42|g");
        assert_eq!(format_gauge("ratio", " 0.25 ").unwrap(), "ratio:0.25|g");
    }

    #[test]
    fn positive_sign_is_dropped() {
        assert_eq!(format_gauge("x", "+3").unwrap(), "x:3|g");
    }

    #[test]
    fn negative_value_is_reset_then_applied() {
        assert_eq!(format_gauge("x", "-7").unwrap(), "x:0|g\nx:-7|g");
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        for value in ["abc", "", "NaN", "inf"] {
            assert!(
                matches!(format_gauge("x", value), Err(SinkError::InvalidMetric { .. })),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn reserved_characters_in_name_are_rejected() {
        for name in ["a:b", "a|b", "a\nb", ""] {
            assert!(matches!(
                format_gauge(name, "1"),
                Err(SinkError::InvalidMetric { .. })
            ));
        }
    }

    #[test]
    fn gauge_reaches_udp_listener() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = StatsdClient::new("127.0.0.1", port, Some(Duration::from_secs(1))).unwrap();
        client.gauge("queue.depth", "42").unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"queue.depth:42|g");
    }

    #[test]
    fn invalid_metric_is_not_sent() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = StatsdClient::new("127.0.0.1", port, None).unwrap();
        assert!(client.gauge("x", "not-a-number").is_err());

        let mut buf = [0u8; 64];
        assert!(listener.recv_from(&mut buf).is_err());
    }
}
