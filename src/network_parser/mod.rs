pub(crate) mod network;

pub(crate) use network::{SiteClient, SiteClientConfig};
