//! Typed server configuration with the spec's defaults, built through a
//! `Builder`, mirroring the teacher's `server::conn::http1::Builder` /
//! `server::conn::http2::Builder` split-builder convention.

use std::path::PathBuf;
use std::time::Duration;

/// Process-wide tunables. All fields have the defaults from the design's
/// configuration section; none are required to construct a working server.
#[derive(Clone, Debug)]
pub struct Config {
    /// Idle-cull threshold for a connection with no read/write activity.
    pub connection_timeout: Duration,
    /// Number of session entries scanned (from the tail of the FIFO) per
    /// `sessionStart` call.
    pub cull_old_session_num: usize,
    /// Root directory the file cache and static handlers resolve paths
    /// against.
    pub document_root: PathBuf,
    /// Files larger than this bypass the marker cache entirely.
    pub max_cache_filesize: u64,
    /// Maximum combined MARKED+UNMARKED entry count.
    pub max_cache_files: usize,
    /// Largest single read performed per readiness cycle.
    pub max_io_len: usize,
    /// Hard cap on a connection's buffered inbound bytes.
    pub max_request_len: usize,
    /// Value reported in the `Host`-less default and in `SERVER_NAME`.
    pub server_name: String,
    /// Port the HTTP(S) listener binds.
    pub server_port: u16,
    /// Port the SMTP listener binds, if the mail variant is enabled.
    pub smtp_port: Option<u16>,
    /// Port the IMAP listener binds, if the mail variant is enabled.
    pub imap_port: Option<u16>,
    /// TLS material; `None` disables TLS and ALPN negotiation entirely
    /// (only h2c prior-knowledge and HTTP/1.1 are then reachable).
    pub tls: Option<TlsConfig>,
}

/// Certificate material and negotiation policy for the TLS-ALPN path.
#[derive(Clone, Debug)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain.
    pub cert_chain: Vec<u8>,
    /// PEM-encoded private key.
    pub private_key: Vec<u8>,
    /// Accept self-signed/unverified client certificates (server-side TLS
    /// here never requests client certs, so this only affects diagnostics).
    pub allow_self_signed: bool,
    /// ALPN protocols offered, in preference order. Defaults to `h2` then
    /// `http/1.1`.
    pub alpn: Vec<Vec<u8>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connection_timeout: Duration::from_secs(20),
            cull_old_session_num: 5,
            document_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_cache_filesize: 2_000_000,
            max_cache_files: 250,
            max_io_len: 131_072,
            max_request_len: 10_000_000,
            server_name: "localhost".to_string(),
            server_port: 8080,
            smtp_port: None,
            imap_port: None,
            tls: None,
        }
    }
}

/// Builds a [`Config`], overriding only the fields the caller cares about.
#[derive(Clone, Debug, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Starts from the spec's defaults.
    pub fn new() -> Self {
        Builder {
            config: Config::default(),
        }
    }

    /// Sets the idle-connection cull threshold.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Sets how many session entries are swept per `sessionStart`.
    pub fn cull_old_session_num(mut self, n: usize) -> Self {
        self.config.cull_old_session_num = n;
        self
    }

    /// Sets the document root used by the file cache.
    pub fn document_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.document_root = root.into();
        self
    }

    /// Sets the marker-cache single-file size ceiling.
    pub fn max_cache_filesize(mut self, bytes: u64) -> Self {
        self.config.max_cache_filesize = bytes;
        self
    }

    /// Sets the marker-cache entry-count ceiling.
    pub fn max_cache_files(mut self, n: usize) -> Self {
        self.config.max_cache_files = n;
        self
    }

    /// Sets the largest single read performed per readiness cycle.
    pub fn max_io_len(mut self, bytes: usize) -> Self {
        self.config.max_io_len = bytes;
        self
    }

    /// Sets the per-connection inbound buffer cap.
    pub fn max_request_len(mut self, bytes: usize) -> Self {
        self.config.max_request_len = bytes;
        self
    }

    /// Sets the advertised server name.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Sets the HTTP(S) listener port.
    pub fn server_port(mut self, port: u16) -> Self {
        self.config.server_port = port;
        self
    }

    /// Enables the SMTP listener on the given port.
    pub fn smtp_port(mut self, port: u16) -> Self {
        self.config.smtp_port = Some(port);
        self
    }

    /// Enables the IMAP listener on the given port.
    pub fn imap_port(mut self, port: u16) -> Self {
        self.config.imap_port = Some(port);
        self
    }

    /// Attaches TLS certificate material, enabling ALPN negotiation.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Finishes building the [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl TlsConfig {
    /// Builds TLS config from PEM cert chain and key bytes, offering the
    /// default `h2, http/1.1` ALPN preference (spec §2 data flow).
    pub fn new(cert_chain: Vec<u8>, private_key: Vec<u8>) -> Self {
        TlsConfig {
            cert_chain,
            private_key,
            allow_self_signed: false,
            alpn: vec![b"h2".to_vec(), b"http/1.1".to_vec()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.connection_timeout, Duration::from_secs(20));
        assert_eq!(cfg.cull_old_session_num, 5);
        assert_eq!(cfg.max_cache_filesize, 2_000_000);
        assert_eq!(cfg.max_cache_files, 250);
        assert_eq!(cfg.max_io_len, 131_072);
        assert_eq!(cfg.max_request_len, 10_000_000);
        assert_eq!(cfg.server_name, "localhost");
    }

    #[test]
    fn builder_overrides() {
        let cfg = Builder::new()
            .server_name("example.test")
            .max_cache_files(10)
            .build();
        assert_eq!(cfg.server_name, "example.test");
        assert_eq!(cfg.max_cache_files, 10);
    }
}
