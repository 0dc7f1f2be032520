use super::{
    delay::DelayPolicy,
    domain::DomainPolicy,
    leaf::{
        ChunkedPolicy, DeletePolicy, FlagPolicy, MapPolicy, Marker, NPolicy, SpeedPolicy,
        StatusPolicy, TextPolicy,
    },
    url::{RemovePolicy, UrlPolicy},
};

/// Capabilities shared by every policy.
pub trait Describe {
    /// Keyword the policy was built from.
    fn keyword(&self) -> &'static str;
    /// Command text that rebuilds this policy.
    fn command(&self) -> String;
    /// Human readable description.
    fn comment(&self) -> String;
}

/// Every policy the command language can produce.
#[derive(Debug, Clone)]
pub enum Policy {
    Marker(Marker),
    Flag(FlagPolicy),
    Text(TextPolicy),
    Map(MapPolicy),
    Chunked(ChunkedPolicy),
    Speed(SpeedPolicy),
    Status(StatusPolicy),
    N(NPolicy),
    Delay(DelayPolicy),
    Url(UrlPolicy),
    Domain(DomainPolicy),
    Remove(RemovePolicy),
    Delete(DeletePolicy),
}

impl Policy {
    fn inner(&self) -> &dyn Describe {
        match self {
            Policy::Marker(p) => p,
            Policy::Flag(p) => p,
            Policy::Text(p) => p,
            Policy::Map(p) => p,
            Policy::Chunked(p) => p,
            Policy::Speed(p) => p,
            Policy::Status(p) => p,
            Policy::N(p) => p,
            Policy::Delay(p) => p,
            Policy::Url(p) => p,
            Policy::Domain(p) => p,
            Policy::Remove(p) => p,
            Policy::Delete(p) => p,
        }
    }
}

impl Describe for Policy {
    fn keyword(&self) -> &'static str {
        self.inner().keyword()
    }

    fn command(&self) -> String {
        self.inner().command()
    }

    fn comment(&self) -> String {
        self.inner().comment()
    }
}
