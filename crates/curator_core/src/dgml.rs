//! Export of dependency subgraphs as DGML documents.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use curator_assets::{AssetDatabase, DependencyGraph, EdgeTarget, Link};
use curator_common::AssetKey;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::CuratorError;

const DGML_NAMESPACE: &str = "http://schemas.microsoft.com/vs/2009/dgml";

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeCategory {
    /// A tracked asset.
    Asset,
    /// A plain file.
    File,
    /// A reference that does not resolve.
    Missing,
}

impl NodeCategory {
    fn as_str(self) -> &'static str {
        match self {
            NodeCategory::Asset => "Asset",
            NodeCategory::File => "File",
            NodeCategory::Missing => "Missing",
        }
    }
}

/// A directed graph ready to be written as DGML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DgmlGraph {
    nodes: BTreeMap<String, (String, NodeCategory)>,
    links: BTreeSet<(String, String, String)>,
}

impl DgmlGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. Adding an existing id keeps the first label.
    pub fn add_node(&mut self, id: &str, label: &str, category: NodeCategory) {
        self.nodes
            .entry(id.to_string())
            .or_insert_with(|| (label.to_string(), category));
    }

    /// Adds a link whose `Category` attribute is `category`.
    pub fn add_link(&mut self, source: &str, target: &str, category: &str) {
        self.links
            .insert((source.to_string(), target.to_string(), category.to_string()));
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Renders the graph as an indented DGML document.
    pub fn to_xml(&self) -> Result<String, CuratorError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;

        let mut root = BytesStart::new("DirectedGraph");
        root.push_attribute(("xmlns", DGML_NAMESPACE));
        writer.write_event(Event::Start(root)).map_err(xml_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("Nodes")))
            .map_err(xml_error)?;
        for (id, (label, category)) in &self.nodes {
            let mut node = BytesStart::new("Node");
            node.push_attribute(("Id", id.as_str()));
            node.push_attribute(("Label", label.as_str()));
            node.push_attribute(("Category", category.as_str()));
            writer.write_event(Event::Empty(node)).map_err(xml_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("Nodes")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("Links")))
            .map_err(xml_error)?;
        for (source, target, category) in &self.links {
            let mut link = BytesStart::new("Link");
            link.push_attribute(("Source", source.as_str()));
            link.push_attribute(("Target", target.as_str()));
            link.push_attribute(("Category", category.as_str()));
            writer.write_event(Event::Empty(link)).map_err(xml_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("Links")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::End(BytesEnd::new("DirectedGraph")))
            .map_err(xml_error)?;

        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }

    /// Writes the document to `path`.
    pub fn write(&self, path: &Path) -> Result<(), CuratorError> {
        let xml = self.to_xml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CuratorError::io(parent, e))?;
        }
        std::fs::write(path, xml).map_err(|e| CuratorError::io(path, e))
    }
}

fn xml_error(e: impl std::fmt::Display) -> CuratorError {
    CuratorError::Export {
        what: "DGML",
        reason: e.to_string(),
    }
}

/// Builds the forward dependency subgraph reachable from `start`, over every
/// dependency kind. Plain files and unresolved references become leaf nodes.
pub fn dependency_subgraph(db: &AssetDatabase, graph: &DependencyGraph, start: AssetKey) -> DgmlGraph {
    let mut dgml = DgmlGraph::new();
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(source) = queue.pop_front() {
        let source_id = db.path_of(source).to_string();
        dgml.add_node(&source_id, &source_id, NodeCategory::Asset);
        for (dep, link) in graph.links(source) {
            let kind = dep.kind.to_string();
            match link {
                Link::Resolved(EdgeTarget::Asset(target)) => {
                    let target_id = db.path_of(*target);
                    dgml.add_node(target_id, target_id, NodeCategory::Asset);
                    dgml.add_link(&source_id, target_id, &kind);
                    if seen.insert(*target) {
                        queue.push_back(*target);
                    }
                }
                Link::Resolved(EdgeTarget::File(path)) => {
                    let id = path.display().to_string();
                    let label = path
                        .file_name()
                        .map_or_else(|| id.clone(), |n| n.to_string_lossy().into_owned());
                    dgml.add_node(&id, &label, NodeCategory::File);
                    dgml.add_link(&source_id, &id, &kind);
                }
                Link::Pending => {
                    let id = format!("missing:{}", dep.reference);
                    dgml.add_node(&id, &dep.reference, NodeCategory::Missing);
                    dgml.add_link(&source_id, &id, &kind);
                }
            }
        }
    }
    dgml
}
