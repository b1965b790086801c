use crate::error::{AnyResult, IoResultExt, RekordsyncError};
use crate::library_parser::{ROOT_TAG, TRACK_ATTRIBUTES};
use crate::models::{Catalog, Node, PositionMark, Tempo, Track};
use log::info;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::path::Path;

type XmlWriter = Writer<Vec<u8>>;

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> AnyResult<()> {
    writer
        .write_event(event)
        .map_err(|err| RekordsyncError::InvalidFormat(format!("Failed to write catalog: {}", err)))
}

fn element<'a>(name: &'a str, attributes: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for attribute in attributes {
        start.push_attribute(*attribute);
    }
    start
}

/// Serialises `catalog` to rekordbox `DJ_PLAYLISTS` markup.
///
/// Tracks come out in TrackID order and numbers use fixed precision, so
/// writing a parsed catalog again gives the same bytes.
pub fn write_catalog(catalog: &Catalog) -> AnyResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::Start(element(ROOT_TAG, &[("Version", "1.0.0")])))?;

    emit(
        &mut writer,
        Event::Empty(element(
            "PRODUCT",
            &[
                ("Name", catalog.product_name.as_str()),
                ("Version", catalog.product_version.as_str()),
                ("Company", catalog.product_company.as_str()),
            ],
        )),
    )?;

    let entries = catalog.tracks.len().to_string();
    emit(&mut writer, Event::Start(element("COLLECTION", &[("Entries", entries.as_str())])))?;
    for track in catalog.tracks.values() {
        write_track(&mut writer, track)?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("COLLECTION")))?;

    emit(&mut writer, Event::Start(BytesStart::new("PLAYLISTS")))?;
    write_node(&mut writer, &catalog.root, catalog)?;
    emit(&mut writer, Event::End(BytesEnd::new("PLAYLISTS")))?;

    emit(&mut writer, Event::End(BytesEnd::new(ROOT_TAG)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn write_catalog_file<P: AsRef<Path>>(catalog: &Catalog, path: P) -> AnyResult<()> {
    let path = path.as_ref();
    let bytes = write_catalog(catalog)?;
    std::fs::write(path, bytes).at(path)?;
    info!("Wrote catalog {:?}: {} tracks", path, catalog.tracks.len());
    Ok(())
}

fn track_attributes(track: &Track) -> [String; 28] {
    [
        track.track_id.to_string(),
        track.name.clone(),
        track.artist.clone(),
        track.composer.clone(),
        track.album.clone(),
        track.grouping.clone(),
        track.genre.clone(),
        track.kind.clone(),
        track.size.to_string(),
        track.total_time.to_string(),
        track.disc_number.to_string(),
        track.track_number.to_string(),
        track.year.to_string(),
        format!("{:.2}", track.average_bpm),
        track.date_added.clone(),
        track.date_modified.clone(),
        track.bit_rate.to_string(),
        format!("{:.0}", track.sample_rate),
        track.comments.clone(),
        track.play_count.to_string(),
        track.last_played.clone(),
        track.rating.to_string(),
        track.location.clone(),
        track.remixer.clone(),
        track.tonality.clone(),
        track.label.clone(),
        track.mix.clone(),
        track.colour.clone(),
    ]
}

fn write_track(writer: &mut XmlWriter, track: &Track) -> AnyResult<()> {
    let values = track_attributes(track);
    let mut start = BytesStart::new("TRACK");
    for (name, value) in TRACK_ATTRIBUTES.iter().zip(values.iter()) {
        start.push_attribute((*name, value.as_str()));
    }
    for (name, value) in &track.extra_attributes {
        if !TRACK_ATTRIBUTES.contains(&name.as_str()) {
            start.push_attribute((name.as_str(), value.as_str()));
        }
    }

    if track.tempos.is_empty() && track.position_marks.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for tempo in &track.tempos {
        write_tempo(writer, tempo)?;
    }
    for mark in &track.position_marks {
        write_position_mark(writer, mark)?;
    }
    emit(writer, Event::End(BytesEnd::new("TRACK")))
}

fn write_tempo(writer: &mut XmlWriter, tempo: &Tempo) -> AnyResult<()> {
    let inizio = format!("{:.3}", tempo.inizio);
    let bpm = format!("{:.2}", tempo.bpm);
    let battito = tempo.battito.to_string();
    emit(
        writer,
        Event::Empty(element(
            "TEMPO",
            &[
                ("Inizio", inizio.as_str()),
                ("Bpm", bpm.as_str()),
                ("Metro", tempo.metro.as_str()),
                ("Battito", battito.as_str()),
            ],
        )),
    )
}

fn write_position_mark(writer: &mut XmlWriter, mark: &PositionMark) -> AnyResult<()> {
    let mut start = BytesStart::new("POSITION_MARK");
    start.push_attribute(("Name", mark.name.as_str()));
    start.push_attribute(("Type", mark.kind.code().to_string().as_str()));
    start.push_attribute(("Start", format!("{:.3}", mark.start).as_str()));
    if let Some(end) = mark.end {
        start.push_attribute(("End", format!("{:.3}", end).as_str()));
    }
    start.push_attribute(("Num", mark.num.to_string().as_str()));
    if let Some(color) = mark.color {
        start.push_attribute(("Red", color.red.to_string().as_str()));
        start.push_attribute(("Green", color.green.to_string().as_str()));
        start.push_attribute(("Blue", color.blue.to_string().as_str()));
    }
    emit(writer, Event::Empty(start))
}

fn write_node(writer: &mut XmlWriter, node: &Node, catalog: &Catalog) -> AnyResult<()> {
    match node {
        Node::Folder { name, children } => {
            let count = children.len().to_string();
            let start = element("NODE", &[("Type", "0"), ("Name", name.as_str()), ("Count", count.as_str())]);
            if children.is_empty() {
                return emit(writer, Event::Empty(start));
            }
            emit(writer, Event::Start(start))?;
            for child in children {
                write_node(writer, child, catalog)?;
            }
            emit(writer, Event::End(BytesEnd::new("NODE")))
        }
        Node::Playlist { name, track_ids } => {
            // Only reference tracks that are actually in the collection.
            let keys: Vec<String> = track_ids
                .iter()
                .filter(|id| catalog.tracks.contains_key(*id))
                .map(i64::to_string)
                .collect();
            let entries = keys.len().to_string();
            let start = element(
                "NODE",
                &[
                    ("Name", name.as_str()),
                    ("Type", "1"),
                    ("KeyType", "0"),
                    ("Entries", entries.as_str()),
                ],
            );
            if keys.is_empty() {
                return emit(writer, Event::Empty(start));
            }
            emit(writer, Event::Start(start))?;
            for key in &keys {
                emit(writer, Event::Empty(element("TRACK", &[("Key", key.as_str())])))?;
            }
            emit(writer, Event::End(BytesEnd::new("NODE")))
        }
    }
}
