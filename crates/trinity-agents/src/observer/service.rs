use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::config::ServiceTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Up { latency: Duration },
    Slow { latency: Duration },
    Down { reason: String },
}

/// Reachability check for one dependency such as a model server.
#[async_trait]
pub trait ServiceCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ServiceStatus;
}

/// Times a TCP connect to `addr`.
#[derive(Debug, Clone)]
pub struct TcpServiceCheck {
    name: String,
    addr: String,
    slow_after: Duration,
    timeout: Duration,
}

impl TcpServiceCheck {
    pub fn new(
        name: impl Into<String>,
        addr: impl Into<String>,
        slow_after: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            slow_after,
            timeout,
        }
    }

    pub fn from_target(target: &ServiceTarget) -> Self {
        Self::new(
            target.name.clone(),
            target.addr.clone(),
            Duration::from_millis(target.slow_after_ms),
            Duration::from_millis(target.timeout_ms),
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ServiceCheck for TcpServiceCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ServiceStatus {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str())).await {
            Ok(Ok(_stream)) => {
                let latency = started.elapsed();
                if latency > self.slow_after {
                    ServiceStatus::Slow { latency }
                } else {
                    ServiceStatus::Up { latency }
                }
            }
            Ok(Err(error)) => ServiceStatus::Down {
                reason: error.to_string(),
            },
            Err(_) => ServiceStatus::Down {
                reason: format!("no answer within {} ms", self.timeout.as_millis()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn listening_port_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr").to_string();
        let check = TcpServiceCheck::new(
            "local",
            addr,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        assert!(matches!(check.check().await, ServiceStatus::Up { .. }));
    }

    #[tokio::test]
    async fn zero_slow_threshold_reports_slow() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr").to_string();
        let check = TcpServiceCheck::new("local", addr, Duration::ZERO, Duration::from_secs(5));

        assert!(matches!(check.check().await, ServiceStatus::Slow { .. }));
    }

    #[tokio::test]
    async fn closed_port_is_down() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind listener");
            listener.local_addr().expect("local addr").to_string()
        };
        let check = TcpServiceCheck::new(
            "gone",
            addr,
            Duration::from_secs(1),
            Duration::from_secs(2),
        );

        assert!(matches!(check.check().await, ServiceStatus::Down { .. }));
    }

    #[test]
    fn from_target_uses_configured_limits() {
        let check = TcpServiceCheck::from_target(&ServiceTarget {
            name: "ollama".to_string(),
            addr: "127.0.0.1:11434".to_string(),
            slow_after_ms: 250,
            timeout_ms: 1_000,
        });
        assert_eq!(check.name(), "ollama");
        assert_eq!(check.addr(), "127.0.0.1:11434");
        assert_eq!(check.slow_after, Duration::from_millis(250));
        assert_eq!(check.timeout, Duration::from_secs(1));
    }
}
