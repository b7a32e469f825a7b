//! Transport configuration: proxy and TLS policy applied to every request.
//!
//! TCP connect, HTTP-CONNECT/SOCKS4/SOCKS5 negotiation, and the TLS handshake
//! itself are all delegated to libcurl (via the `curl` crate, already used
//! for the HTTP client); this module only models the configuration and
//! applies it to a `curl::easy::Easy` handle before each request.

use std::time::Duration;

use anyhow::{Context, Result};
use curl::easy::{Easy, ProxyType};

use crate::config::{ProxyConfig, ProxyKind};

/// Proxy/TLS/timeout policy shared by every request a task makes.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub proxy: ProxyConfig,
    /// `false` disables certificate and hostname verification (permissive mode).
    pub verify_ssl: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions {
            proxy: ProxyConfig::default(),
            verify_ssl: true,
            connect_timeout: Duration::from_millis(30_000),
            read_timeout: Duration::from_millis(30_000),
        }
    }
}

impl TransportOptions {
    /// Applies proxy, TLS, and timeout settings to a curl handle. Call before
    /// every HEAD/GET so per-task overrides (proxy, verify_ssl) aren't lost
    /// when handles are reused.
    pub fn apply(&self, easy: &mut Easy) -> Result<()> {
        easy.connect_timeout(self.connect_timeout)
            .context("failed to set connect timeout")?;
        easy.timeout(self.read_timeout)
            .context("failed to set read timeout")?;

        easy.ssl_verify_peer(self.verify_ssl)
            .context("failed to set ssl_verify_peer")?;
        easy.ssl_verify_host(self.verify_ssl)
            .context("failed to set ssl_verify_host")?;

        if self.proxy.kind != ProxyKind::None {
            if self.proxy.host.is_empty() {
                anyhow::bail!("proxy configured with empty host");
            }
            let scheme = match self.proxy.kind {
                ProxyKind::Http => "http",
                ProxyKind::Socks4 => "socks4",
                ProxyKind::Socks5 => "socks5",
                ProxyKind::None => unreachable!(),
            };
            easy.proxy(&format!("{}://{}", scheme, self.proxy.host))
                .context("failed to set proxy host")?;
            easy.proxy_port(self.proxy.port)
                .context("failed to set proxy port")?;

            let curl_proxy_type = match self.proxy.kind {
                ProxyKind::Http => ProxyType::Http,
                ProxyKind::Socks4 => ProxyType::Socks4,
                // SOCKS5 resolves the destination hostname through the proxy
                // (ATYP=domain name) rather than locally.
                ProxyKind::Socks5 => ProxyType::Socks5Hostname,
                ProxyKind::None => unreachable!(),
            };
            easy.proxy_type(curl_proxy_type)
                .context("failed to set proxy type")?;

            if !self.proxy.username.is_empty() {
                easy.proxy_username(&self.proxy.username)
                    .context("failed to set proxy username")?;
                easy.proxy_password(&self.proxy.password)
                    .context("failed to set proxy password")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_proxy_and_strict_tls() {
        let opts = TransportOptions::default();
        assert_eq!(opts.proxy.kind, ProxyKind::None);
        assert!(opts.verify_ssl);
    }

    #[test]
    fn apply_rejects_proxy_with_empty_host() {
        let mut opts = TransportOptions::default();
        opts.proxy.kind = ProxyKind::Socks5;
        let mut easy = Easy::new();
        assert!(opts.apply(&mut easy).is_err());
    }

    #[test]
    fn apply_accepts_configured_http_proxy() {
        let mut opts = TransportOptions::default();
        opts.proxy.kind = ProxyKind::Http;
        opts.proxy.host = "proxy.example.com".to_string();
        opts.proxy.port = 8080;
        let mut easy = Easy::new();
        assert!(opts.apply(&mut easy).is_ok());
    }
}
