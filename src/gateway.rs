use fxhash::FxHashSet;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Signal strength reported by a gateway for one beacon sighting.
pub type Rssi = i32;

/// Hardware identity of a gateway.
///
/// Backed by a shared string so cloning it into every bucket touch is a
/// reference-count bump rather than an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GatewayId(Arc<str>);

impl GatewayId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for GatewayId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GatewayId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GatewayId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed set of gateways whose readings are accepted.
///
/// Cloning is cheap; every clone shares the same set.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    gateways: Arc<FxHashSet<GatewayId>>,
}

impl AllowList {
    /// The three gateways deployed on the original site.
    pub const DEFAULT_GATEWAYS: [&'static str; 3] =
        ["94A408B06608", "94A408B03D34", "94A408B08890"];

    pub fn new<I, S>(gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            gateways: Arc::new(gateways.into_iter().map(GatewayId::new).collect()),
        }
    }

    pub fn default_gateways() -> Self {
        Self::new(Self::DEFAULT_GATEWAYS)
    }

    /// Looks up the interned id for `id`. Does not allocate.
    #[inline(always)]
    pub fn get(&self, id: &str) -> Option<&GatewayId> {
        self.gateways.get(id)
    }

    #[inline(always)]
    pub fn contains(&self, id: &str) -> bool {
        self.gateways.contains(id)
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GatewayId> {
        self.gateways.iter()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}
