//! Decoded map primitives, as they are handed to a MapHandler. These hold
//! absolute ids and coordinates, all delta encoding has been resolved by the
//! time they are created.

use std::sync::Arc;

/// A single key/value tag. Strings are shared between all primitives decoded
/// in the same session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTag {
    pub key: Arc<str>,
    pub value: Arc<str>,
}

/// Look up the value of a tag by key, if present
fn find_tag<'a>(tags: &'a [MapTag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| &*tag.key == key)
        .map(|tag| &*tag.value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Vec<MapTag>,
}

impl MapNode {
    pub fn tag(&self, key: &str) -> Option<&str> {
        find_tag(&self.tags, key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapWay {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Vec<MapTag>,
}

impl MapWay {
    pub fn tag(&self, key: &str) -> Option<&str> {
        find_tag(&self.tags, key)
    }
}

/// The type of primitive which a relation member points to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapMember {
    pub kind: MemberKind,
    pub reference: i64,
    pub role: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapRelation {
    pub id: i64,
    pub members: Vec<MapMember>,
    pub tags: Vec<MapTag>,
}

impl MapRelation {
    pub fn tag(&self, key: &str) -> Option<&str> {
        find_tag(&self.tags, key)
    }

    /// Fetch the first member with the provided role and kind
    pub fn member(&self, role: &str, kind: MemberKind) -> Option<&MapMember> {
        self.members
            .iter()
            .find(|member| member.kind == kind && &*member.role == role)
    }
}

/// Receives primitives from a decoder, in the order they appear in the
/// source file
pub trait MapHandler {
    fn add_node(&mut self, node: MapNode);
    fn add_way(&mut self, way: MapWay);
    fn add_relation(&mut self, relation: MapRelation);
}

impl<H: MapHandler + ?Sized> MapHandler for &mut H {
    fn add_node(&mut self, node: MapNode) {
        (**self).add_node(node)
    }

    fn add_way(&mut self, way: MapWay) {
        (**self).add_way(way)
    }

    fn add_relation(&mut self, relation: MapRelation) {
        (**self).add_relation(relation)
    }
}
