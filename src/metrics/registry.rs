use crate::metrics::{GaugeDef, MetricsConfig};
use prometheus::{Encoder as _, GaugeVec, Opts, Registry, TextEncoder};
use std::fmt;

/// Collection of gauges exposed together, either on the pull endpoint or in one push
///
/// Cloning yields another handle on the same underlying registry.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Registry,
    scope: Scope,
}

/// Lifecycle of a [`MetricsRegistry`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Shared by the whole process, for its whole lifetime
    ProcessWide,
    /// Private to one invocation, discarded afterwards
    Isolated,
}

impl MetricsRegistry {
    /// Handle on the registry shared by the whole process
    ///
    /// Every call returns the same registry, so registering the backup gauges
    /// through two handles fails.
    #[must_use]
    pub fn process_wide() -> Self {
        Self {
            inner: prometheus::default_registry().clone(),
            scope: Scope::ProcessWide,
        }
    }

    /// Fresh, empty registry
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            inner: Registry::new(),
            scope: Scope::Isolated,
        }
    }

    /// Lifecycle this registry was constructed with
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Renders every registered metric in the Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if a gathered metric family cannot be encoded
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// `Content-Type` of [`Self::encode`] output
    pub const CONTENT_TYPE: &'static str = prometheus::TEXT_FORMAT;

    pub(super) fn begin_registration<'a>(&'a self, config: &'a MetricsConfig) -> Registration<'a> {
        Registration {
            registry: self,
            config,
            registered: Vec::new(),
        }
    }
}
impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// In-progress registration of a gauge set
///
/// Dropping without [`Registration::commit`] unregisters every gauge added so far.
pub(super) struct Registration<'a> {
    registry: &'a MetricsRegistry,
    config: &'a MetricsConfig,
    registered: Vec<GaugeVec>,
}
impl Registration<'_> {
    pub(super) fn gauge(&mut self, def: &GaugeDef) -> Result<GaugeVec, RegistrationError> {
        let GaugeDef { name, help } = *def;
        let MetricsConfig { schema, namespace } = self.config;

        let make_err = |source| RegistrationError {
            name: name.to_string(),
            source,
        };

        let mut opts = Opts::new(name, help);
        if let Some(namespace) = namespace {
            opts = opts.namespace(namespace.clone());
        }
        let gauge = GaugeVec::new(opts, schema.label_names()).map_err(make_err)?;
        self.registry
            .inner
            .register(Box::new(gauge.clone()))
            .map_err(make_err)?;

        self.registered.push(gauge.clone());
        Ok(gauge)
    }

    pub(super) fn commit(mut self) {
        self.registered.clear();
    }
}
impl Drop for Registration<'_> {
    fn drop(&mut self) {
        for gauge in self.registered.drain(..) {
            // ignore, unregistering what was just registered
            let _ = self.registry.inner.unregister(Box::new(gauge));
        }
    }
}

/// Gauge could not be registered, typically because the name is already taken
#[derive(Debug)]
pub struct RegistrationError {
    name: String,
    source: prometheus::Error,
}
impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { name, source } = self;
        write!(f, "failed to register gauge {name:?}: {source}")
    }
}
