//! Schedule XML parser
//!
//! Converts the published schedule document (`schedule → conference,
//! tracks, days → rooms → events → persons`) into a normalized in-memory
//! tree. Repeated elements always collect into `Vec`s, so single-item and
//! list-item encodings converge. A track reference appears either as a
//! bare string or as a node carrying a color attribute; both normalize
//! into [`TrackRef`].

use crate::{Error, Result};
use serde::Serialize;

/// Fully parsed schedule document.
#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub conference: ConferenceMeta,
    pub tracks: Vec<TrackRef>,
    pub days: Vec<Day>,
}

/// Conference metadata from the document header.
#[derive(Debug, Clone, Serialize)]
pub struct ConferenceMeta {
    pub title: String,
    pub acronym: String,
}

/// A track reference: bare name, or name with a display color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TrackRef {
    Name(String),
    Named { name: String, color: String },
}

impl TrackRef {
    pub fn name(&self) -> &str {
        match self {
            TrackRef::Name(name) => name,
            TrackRef::Named { name, .. } => name,
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            TrackRef::Name(_) => None,
            TrackRef::Named { color, .. } => Some(color),
        }
    }
}

/// One conference day. A missing `date` attribute is kept as `None` and
/// rejected by the importer, not here.
#[derive(Debug, Clone, Serialize)]
pub struct Day {
    pub date: Option<String>,
    pub rooms: Vec<RoomNode>,
}

/// One room within a day.
#[derive(Debug, Clone, Serialize)]
pub struct RoomNode {
    pub name: Option<String>,
    pub events: Vec<EventNode>,
}

/// One session event. Absent or malformed fields stay `None`; a single
/// malformed event never aborts parsing.
#[derive(Debug, Clone, Serialize)]
pub struct EventNode {
    pub id: Option<String>,
    pub unique_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub track: Option<TrackRef>,
    pub start: Option<String>,
    pub duration: Option<String>,
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    pub bookmarkable: bool,
    pub rateable: bool,
    pub persons: Vec<PersonNode>,
}

/// A person attached to an event.
#[derive(Debug, Clone, Serialize)]
pub struct PersonNode {
    pub external_id: Option<String>,
    pub display_name: String,
    pub bio: Option<String>,
    pub organization: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Parsed from the `socials` attribute (a JSON list); unparseable
    /// content degrades to an empty list.
    pub socials: Vec<String>,
}

/// Parse raw schedule XML into the normalized tree.
///
/// Fails with a parse error when the document is not well-formed XML or
/// the top-level `schedule` element is absent.
pub fn parse_schedule(xml: &str) -> Result<Schedule> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| Error::Parse(format!("Invalid XML: {}", e)))?;

    let root = doc.root_element();
    if root.tag_name().name() != "schedule" {
        return Err(Error::Parse("schedule element not found".to_string()));
    }

    let conference = root
        .children()
        .find(|n| n.has_tag_name("conference"))
        .map(|n| ConferenceMeta {
            title: child_text(&n, "title").unwrap_or_default(),
            acronym: child_text(&n, "acronym").unwrap_or_default(),
        })
        .ok_or_else(|| Error::Parse("conference element not found".to_string()))?;

    let tracks = root
        .children()
        .filter(|n| n.has_tag_name("tracks"))
        .flat_map(|tracks| {
            tracks
                .children()
                .filter(|n| n.has_tag_name("track"))
                .filter_map(|n| parse_track_ref(&n))
                .collect::<Vec<_>>()
        })
        .collect();

    let days = root
        .children()
        .filter(|n| n.has_tag_name("day"))
        .map(|day| Day {
            date: day.attribute("date").map(str::to_string),
            rooms: day
                .children()
                .filter(|n| n.has_tag_name("room"))
                .map(|room| RoomNode {
                    name: room.attribute("name").map(str::to_string),
                    events: room
                        .children()
                        .filter(|n| n.has_tag_name("event"))
                        .map(|event| parse_event(&event))
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(Schedule {
        conference,
        tracks,
        days,
    })
}

fn parse_track_ref(node: &roxmltree::Node) -> Option<TrackRef> {
    let name = node.text().map(str::trim).filter(|t| !t.is_empty())?;
    match node.attribute("color") {
        Some(color) => Some(TrackRef::Named {
            name: name.to_string(),
            color: color.to_string(),
        }),
        None => Some(TrackRef::Name(name.to_string())),
    }
}

fn parse_event(node: &roxmltree::Node) -> EventNode {
    let track = node
        .children()
        .find(|n| n.has_tag_name("track"))
        .and_then(|n| parse_track_ref(&n));

    let persons = node
        .children()
        .filter(|n| n.has_tag_name("persons"))
        .flat_map(|persons| {
            persons
                .children()
                .filter(|n| n.has_tag_name("person"))
                .map(|n| parse_person(&n))
                .collect::<Vec<_>>()
        })
        .collect();

    EventNode {
        id: node.attribute("id").map(str::to_string),
        unique_id: node.attribute("unique_id").map(str::to_string),
        title: child_text(node, "title"),
        url: child_text(node, "url"),
        track,
        start: child_text(node, "start"),
        duration: child_text(node, "duration"),
        abstract_text: child_text(node, "abstract"),
        description: child_text(node, "description"),
        bookmarkable: node.attribute("bookmark") == Some("1"),
        rateable: node.attribute("rating") == Some("1"),
        persons,
    }
}

fn parse_person(node: &roxmltree::Node) -> PersonNode {
    let socials = node
        .attribute("socials")
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .unwrap_or_default();

    PersonNode {
        external_id: node.attribute("id").map(str::to_string),
        display_name: node.text().map(str::trim).unwrap_or_default().to_string(),
        bio: node.attribute("bio").map(str::to_string),
        organization: node.attribute("organization").map(str::to_string),
        thumbnail_url: node.attribute("thumbnail").map(str::to_string),
        socials,
    }
}

fn child_text(node: &roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
