//! Builder for documents used in tests and demos.
//!
//! Entities are written straight into the document without going through
//! requests, so a freshly built scenario has an empty undo history.

use serde_json::Value;

use crate::config::EngineConfig;
use crate::editor::Editor;
use crate::error::DocumentError;
use crate::id::EntityId;
use crate::model::component::{Component, Joint};
use crate::model::document::Document;
use crate::model::geometry::Geometry;
use crate::model::registry::Registry;

/// IDs returned by [`Scenario::beam_site`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamSite {
    pub layer: EntityId,
    pub beam: EntityId,
    pub openings: Vec<EntityId>,
    pub panels: Vec<EntityId>,
    pub contents: Vec<EntityId>,
}

pub struct Scenario {
    registry: Registry,
    document: Document,
}

impl Scenario {
    pub fn new() -> Self {
        Self::with_registry(Registry::with_builtin_classes())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            document: Document::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Add an entity of `class_name`, optionally hosted by `host`.
    pub fn add(&mut self, class_name: &str, host: Option<EntityId>) -> Result<EntityId, DocumentError> {
        let id = self.document.create_entity(&self.registry, class_name)?;
        self.document.set_host(id, host)?;
        Ok(id)
    }

    pub fn set_property(&mut self, id: EntityId, key: &str, value: Value) -> Result<(), DocumentError> {
        self.document.set_property(id, key, Some(value))?;
        Ok(())
    }

    pub fn attach(&mut self, id: EntityId, component: Component) -> Result<(), DocumentError> {
        self.document.attach_component(id, component)?;
        Ok(())
    }

    /// Attach a `Joint` at the given point.
    pub fn joint(&mut self, id: EntityId, at: [f64; 3]) -> Result<(), DocumentError> {
        self.attach(
            id,
            Component::Joint(Joint {
                location: Geometry::point(at[0], at[1], at[2]),
                members: vec![],
                angle: 0.0,
            }),
        )
    }

    /// A layer holding one beam, the beam hosting the requested number of
    /// openings, panels and free-standing wall content.
    pub fn beam_site(
        &mut self,
        openings: usize,
        panels: usize,
        contents: usize,
    ) -> Result<BeamSite, DocumentError> {
        let layer = self.add("Layer", None)?;
        let beam = self.add("Beam", Some(layer))?;
        self.joint(beam, [0.0, 0.0, 0.0])?;
        let mut site = BeamSite {
            layer,
            beam,
            openings: Vec::with_capacity(openings),
            panels: Vec::with_capacity(panels),
            contents: Vec::with_capacity(contents),
        };
        for _ in 0..openings {
            site.openings.push(self.add("Opening", Some(beam))?);
        }
        for _ in 0..panels {
            site.panels.push(self.add("Panel", Some(beam))?);
        }
        for _ in 0..contents {
            site.contents.push(self.add("WallContent", Some(beam))?);
        }
        Ok(site)
    }

    pub fn into_parts(self) -> (Registry, Document) {
        (self.registry, self.document)
    }

    /// Hand the built document to an editor with a clean history.
    pub fn into_editor(self, config: EngineConfig) -> Editor {
        let (registry, mut document) = self.into_parts();
        document.drain_signals();
        document.take_dirty();
        Editor::with_document(config, registry, document)
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}
