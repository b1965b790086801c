use crate::error::{AnyResult, IoResultExt, RekordsyncError};
use crate::models::{Catalog, CueColor, Node, PositionMark, PositionMarkType, Tempo, Track};
use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use std::str::FromStr;

pub(crate) const ROOT_TAG: &str = "DJ_PLAYLISTS";

/// Every TRACK attribute with a dedicated field, in write order.
pub(crate) const TRACK_ATTRIBUTES: [&str; 28] = [
    "TrackID",
    "Name",
    "Artist",
    "Composer",
    "Album",
    "Grouping",
    "Genre",
    "Kind",
    "Size",
    "TotalTime",
    "DiscNumber",
    "TrackNumber",
    "Year",
    "AverageBpm",
    "DateAdded",
    "DateModified",
    "BitRate",
    "SampleRate",
    "Comments",
    "PlayCount",
    "LastPlayed",
    "Rating",
    "Location",
    "Remixer",
    "Tonality",
    "Label",
    "Mix",
    "Colour",
];

/// Minimal element tree; the catalog is small enough to hold in memory.
#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn string(&self, name: &str) -> String {
        self.attr(name).unwrap_or_default().to_string()
    }

    /// Missing or unparsable values read as the type's default.
    fn number<T: FromStr + Default>(&self, name: &str) -> T {
        self.optional(name).unwrap_or_default()
    }

    fn optional<T: FromStr>(&self, name: &str) -> Option<T> {
        self.attr(name).and_then(|value| value.trim().parse().ok())
    }
}

fn malformed(err: impl std::fmt::Display) -> RekordsyncError {
    RekordsyncError::InvalidFormat(err.to_string())
}

fn element_from(start: &BytesStart) -> AnyResult<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn read_tree(bytes: &[u8]) -> AnyResult<Option<Element>> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("Unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed("Unexpected end of document"));
    }
    Ok(root)
}

/// Parses rekordbox `DJ_PLAYLISTS` markup into a catalog.
pub fn parse_catalog(bytes: &[u8]) -> AnyResult<Catalog> {
    let root = match read_tree(bytes)? {
        Some(root) if root.name == ROOT_TAG => root,
        _ => return Err(malformed("Missing DJ_PLAYLISTS root element")),
    };

    let mut catalog = Catalog::new();

    if let Some(product) = root.child("PRODUCT") {
        catalog.product_name = product.string("Name");
        catalog.product_version = product.string("Version");
        catalog.product_company = product.string("Company");
    }

    if let Some(collection) = root.child("COLLECTION") {
        for element in collection.children_named("TRACK") {
            catalog.insert_track(parse_track(element));
        }
    }

    if let Some(node) = root.child("PLAYLISTS").and_then(|playlists| playlists.child("NODE")) {
        catalog.root = parse_node(node);
    }

    debug!(
        "Parsed catalog: {} tracks, {} playlists",
        catalog.tracks.len(),
        catalog.root.playlist_count()
    );
    Ok(catalog)
}

/// Reads and parses a catalog file. A missing file is an I/O error; deciding
/// to start from an empty catalog instead is up to the caller.
pub fn parse_catalog_file<P: AsRef<Path>>(path: P) -> AnyResult<Catalog> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).at(path)?;
    let catalog = parse_catalog(&bytes)?;
    info!("Loaded catalog {:?}: {} tracks", path, catalog.tracks.len());
    Ok(catalog)
}

fn parse_track(element: &Element) -> Track {
    let mut track = Track::new(element.number("TrackID"));

    track.name = element.string("Name");
    track.artist = element.string("Artist");
    track.composer = element.string("Composer");
    track.album = element.string("Album");
    track.grouping = element.string("Grouping");
    track.genre = element.string("Genre");
    track.kind = element.string("Kind");
    track.size = element.number("Size");
    track.total_time = element.number("TotalTime");
    track.disc_number = element.number("DiscNumber");
    track.track_number = element.number("TrackNumber");
    track.year = element.number("Year");
    track.average_bpm = element.number("AverageBpm");
    track.date_added = element.string("DateAdded");
    track.date_modified = element.string("DateModified");
    track.bit_rate = element.number("BitRate");
    track.sample_rate = element.number("SampleRate");
    track.comments = element.string("Comments");
    track.play_count = element.number("PlayCount");
    track.last_played = element.string("LastPlayed");
    track.rating = element.number("Rating");
    track.location = element.string("Location");
    track.remixer = element.string("Remixer");
    track.tonality = element.string("Tonality");
    track.label = element.string("Label");
    track.mix = element.string("Mix");
    track.colour = element.string("Colour");

    for (key, value) in &element.attributes {
        if !TRACK_ATTRIBUTES.contains(&key.as_str()) {
            track.extra_attributes.insert(key.clone(), value.clone());
        }
    }

    track.tempos = element
        .children_named("TEMPO")
        .map(|tempo| Tempo {
            inizio: tempo.number("Inizio"),
            bpm: tempo.number("Bpm"),
            metro: tempo.string("Metro"),
            battito: tempo.number("Battito"),
        })
        .collect();

    track.position_marks = element
        .children_named("POSITION_MARK")
        .map(parse_position_mark)
        .collect();

    track
}

fn parse_position_mark(element: &Element) -> PositionMark {
    let color = match (
        element.optional("Red"),
        element.optional("Green"),
        element.optional("Blue"),
    ) {
        (Some(red), Some(green), Some(blue)) => Some(CueColor { red, green, blue }),
        _ => None,
    };

    PositionMark {
        name: element.string("Name"),
        kind: PositionMarkType::from_code(element.number("Type")),
        start: element.number("Start"),
        end: element.optional("End"),
        num: element.number("Num"),
        color,
    }
}

fn parse_node(element: &Element) -> Node {
    let name = element.string("Name");
    if element.number::<i64>("Type") == 1 {
        let track_ids = element
            .children_named("TRACK")
            .filter_map(|entry| entry.optional("Key"))
            .collect();
        Node::Playlist { name, track_ids }
    } else {
        let children = element.children_named("NODE").map(parse_node).collect();
        Node::Folder { name, children }
    }
}
