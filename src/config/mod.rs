//! Configuration - the system topology graph, its validation passes and the
//! YAML loader that fills it

mod attrs;
mod deps;
mod error;
mod graph;
pub mod loader;
mod model;

pub use attrs::TemplateSpec;
pub use deps::Endpoint;
pub use error::{ConfigError, EntityKind, Unresolved};
pub use graph::ConfigGraph;
pub use model::{
    AttrTemplate, AttrValues, Class, Datacentre, Host, Location, NameWidths, Server,
    DEFAULT_SSH_PORT, SSH_PORT_ATTR,
};
