//! Push transport to a Prometheus Pushgateway

use crate::metrics::{MetricKey, MetricsRegistry};
use base64::Engine as _;
use std::time::Duration;

/// Pushgateway address and request options
#[derive(Clone, Debug)]
pub struct Gateway {
    base_url: String,
    timeout: Duration,
}
impl Gateway {
    /// Timeout used unless [`Self::with_timeout`] is called
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Gateway at `address`, given as `host:port` with an optional `http://` or `https://` prefix
    #[must_use]
    pub fn new(address: &str) -> Self {
        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        Self {
            base_url,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the request timeout (rounded up to whole seconds)
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL addressing `job`, grouped by every label of `grouping`
    ///
    /// Values outside the URL-safe characters are sent base64 encoded
    /// (`<label>@base64/<value>`), as the Pushgateway API requires for values
    /// containing `/` and allows for anything else.
    #[must_use]
    pub fn push_url(&self, job: &str, grouping: &MetricKey) -> String {
        let mut url = format!("{}/metrics", self.base_url);
        push_segment(&mut url, "job", job);
        for (name, value) in grouping.label_pairs() {
            push_segment(&mut url, name, value);
        }
        url
    }

    /// Replaces the gateway's metrics for `job` and `grouping` with every metric in `registry`
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable, the request times out,
    /// or the gateway answers with a non-success status
    pub fn push(
        &self,
        registry: &MetricsRegistry,
        job: &str,
        grouping: &MetricKey,
    ) -> Result<(), PushError> {
        let body = registry.encode().map_err(PushError::Encode)?;
        let url = self.push_url(job, grouping);
        tracing::debug!(%url, bytes = body.len(), "pushing metrics");

        let timeout_secs = self.timeout.as_secs()
            + if self.timeout.subsec_nanos() > 0 { 1 } else { 0 };
        let response = minreq::put(url.as_str())
            .with_header("Content-Type", MetricsRegistry::CONTENT_TYPE)
            .with_body(body)
            .with_timeout(timeout_secs.max(1))
            .send()
            .map_err(|source| PushError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status_code;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(PushError::Rejected {
                url,
                status,
                body: response.as_str().unwrap_or_default().to_string(),
            })
        }
    }
}

fn push_segment(url: &mut String, name: &str, value: &str) {
    let url_safe = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~');
    url.push('/');
    if value.is_empty() {
        // the Pushgateway spelling of an empty value
        url.push_str(name);
        url.push_str("@base64/=");
    } else if value.bytes().all(url_safe) {
        url.push_str(name);
        url.push('/');
        url.push_str(value);
    } else {
        url.push_str(name);
        url.push_str("@base64/");
        url.push_str(&base64::engine::general_purpose::URL_SAFE.encode(value));
    }
}

/// Metrics could not be delivered to the gateway
#[derive(Debug)]
pub enum PushError {
    /// Registry contents could not be rendered
    Encode(prometheus::Error),
    /// Gateway unreachable or the request timed out
    Transport {
        /// Request URL
        url: String,
        /// Underlying HTTP failure
        source: minreq::Error,
    },
    /// Gateway answered with a non-success status
    Rejected {
        /// Request URL
        url: String,
        /// HTTP status code
        status: i32,
        /// Response body, for diagnosis
        body: String,
    },
}
impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(source) => Some(source),
            Self::Transport { source, .. } => Some(source),
            Self::Rejected { .. } => None,
        }
    }
}
impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(_) => write!(f, "failed to encode metrics for push"),
            Self::Transport { url, .. } => write!(f, "failed to reach push gateway at {url}"),
            Self::Rejected { url, status, body } => {
                write!(f, "push gateway rejected {url} with status {status}: {body}")
            }
        }
    }
}
