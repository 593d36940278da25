#[macro_use]
mod macros;

pub mod component;
pub mod document;
pub mod entity;
pub mod geometry;
pub mod registry;
pub mod signal;

pub use component::{Component, ComponentKind, HoleMarker, Joint, TreeNode, TreeRun};
pub use document::Document;
pub use entity::{ClassTraits, Entity, EntityDump, HostDependency};
pub use geometry::Geometry;
pub use registry::{EntityFactory, Registry};
pub use signal::{Signal, SignalKind};
