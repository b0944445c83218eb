//! XMLTV interchange document
//!
//! Writes the finalized roster to the XMLTV format consumed by downstream
//! players, and reads a previously written document back into channels so
//! the cross-roster merge can reuse still-fresh days across restarts.
//!
//! The engine hands the writer channels whose programs are deduplicated
//! and carry resolved end times; the writer itself only sorts.
//!
//! Document shape: <https://github.com/XMLTV/xmltv/blob/master/xmltv.dtd>

use chrono::{DateTime, FixedOffset, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io;
use std::path::Path;
use tracing::warn;

use crate::error::XmltvError;
use crate::models::{epoch, Channel, ChannelMeta, Program};

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S %z";

/// Write the roster to `path`, atomically via a temp file.
///
/// The root element carries `generator-info-name` and a `date` attribute
/// equal to the latest `last_update` across the roster, normalized to UTC.
/// Channel elements come first, then every channel's programmes sorted by
/// start time. Empty sub-titles and descriptions are omitted.
pub fn write(path: &Path, channels: &[Channel], generator_info: &str) -> Result<(), XmltvError> {
    let mut buf = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(
        "tv SYSTEM \"xmltv.dtd\"",
    )))?;

    let mut tv = BytesStart::new("tv");
    tv.push_attribute(("generator-info-name", generator_info));
    if let Some(latest) = channels
        .iter()
        .map(|c| c.meta.last_update.with_timezone(&Utc))
        .max()
    {
        tv.push_attribute(("date", latest.format(STAMP_FORMAT).to_string().as_str()));
    }
    writer.write_event(Event::Start(tv))?;

    for channel in channels {
        let mut el = BytesStart::new("channel");
        el.push_attribute(("id", channel.id.as_str()));
        writer.write_event(Event::Start(el))?;
        for name in &channel.meta.names {
            write_text_element(&mut writer, "display-name", name)?;
        }
        writer.write_event(Event::End(BytesEnd::new("channel")))?;
    }

    for channel in channels {
        let mut programs: Vec<&Program> = channel.programs.iter().collect();
        programs.sort_by_key(|p| p.start_time);
        for program in programs {
            let mut el = BytesStart::new("programme");
            el.push_attribute(("start", format_stamp(program.start_time).as_str()));
            el.push_attribute(("stop", format_stamp(program.end_time).as_str()));
            el.push_attribute(("channel", channel.id.as_str()));
            writer.write_event(Event::Start(el))?;
            write_text_element(&mut writer, "title", &program.title)?;
            if !program.sub_title.is_empty() {
                write_text_element(&mut writer, "sub-title", &program.sub_title)?;
            }
            if !program.desc.is_empty() {
                write_text_element(&mut writer, "desc", &program.desc)?;
            }
            writer.write_event(Event::End(BytesEnd::new("programme")))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("tv")))?;
    buf.push(b'\n');

    // Atomic replace so a crash mid-write never corrupts the prior document.
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &buf)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read a previously written document back into a roster.
///
/// Every recovered channel's `last_update` is the root `date` attribute
/// (the epoch sentinel when absent). A missing file is not an error: it
/// yields an empty roster, the first-run case.
pub fn read(path: &Path, offset: FixedOffset) -> Result<Vec<Channel>, XmltvError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    parse(&content, offset)
}

fn parse(content: &str, offset: FixedOffset) -> Result<Vec<Channel>, XmltvError> {
    #[derive(Clone, Copy)]
    enum Field {
        DisplayName,
        Title,
        SubTitle,
        Desc,
    }

    let mut reader = Reader::from_str(content);

    let mut channels: Vec<Channel> = Vec::new();
    let mut last_update: Option<DateTime<FixedOffset>> = None;
    let mut current_channel: Option<Channel> = None;
    let mut current_program: Option<(String, Program)> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"tv" => {
                    if let Some(stamp) = attribute(&e, b"date")? {
                        last_update = Some(parse_stamp(&stamp, offset)?);
                    }
                }
                b"channel" => {
                    let id = attribute(&e, b"id")?
                        .ok_or(XmltvError::MissingAttribute("channel id"))?;
                    current_channel =
                        Some(Channel::new(id, ChannelMeta::new(Vec::new(), offset)));
                }
                b"display-name" => field = Some(Field::DisplayName),
                b"programme" => {
                    let start = attribute(&e, b"start")?
                        .ok_or(XmltvError::MissingAttribute("programme start"))?;
                    let stop = attribute(&e, b"stop")?
                        .ok_or(XmltvError::MissingAttribute("programme stop"))?;
                    let channel_id = attribute(&e, b"channel")?
                        .ok_or(XmltvError::MissingAttribute("programme channel"))?;
                    current_program = Some((
                        channel_id,
                        Program::new(
                            "",
                            parse_stamp(&start, offset)?,
                            parse_stamp(&stop, offset)?,
                            "",
                        ),
                    ));
                }
                b"title" => field = Some(Field::Title),
                b"sub-title" => field = Some(Field::SubTitle),
                b"desc" => field = Some(Field::Desc),
                _ => {}
            },
            Event::Text(e) => {
                // Whitespace-only nodes are the writer's own indentation.
                let raw = e.unescape()?;
                let text = raw.trim();
                if text.is_empty() {
                    continue;
                }
                let text = text.to_string();
                match (field, &mut current_channel, &mut current_program) {
                    (Some(Field::DisplayName), Some(channel), _) => {
                        channel.meta.names.push(text);
                    }
                    (Some(Field::Title), _, Some((_, program))) => program.title = text,
                    (Some(Field::SubTitle), _, Some((_, program))) => program.sub_title = text,
                    (Some(Field::Desc), _, Some((_, program))) => program.desc = text,
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"channel" => {
                    if let Some(channel) = current_channel.take() {
                        channels.push(channel);
                    }
                }
                b"programme" => {
                    if let Some((channel_id, program)) = current_program.take() {
                        if program.title.is_empty() {
                            warn!(channel = %channel_id, "dropping programme without title");
                        } else if let Some(channel) =
                            channels.iter_mut().find(|c| c.id == channel_id)
                        {
                            channel.programs.push(program);
                        } else {
                            let mut channel = Channel::new(
                                channel_id,
                                ChannelMeta::new(Vec::new(), offset),
                            );
                            channel.programs.push(program);
                            channels.push(channel);
                        }
                    }
                }
                b"display-name" | b"title" | b"sub-title" | b"desc" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let last_update = last_update.unwrap_or_else(|| epoch(offset));
    for channel in &mut channels {
        channel.meta.last_update = last_update;
        channel.sort_programs();
    }
    Ok(channels)
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XmltvError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn format_stamp(dt: DateTime<FixedOffset>) -> String {
    dt.format(STAMP_FORMAT).to_string()
}

fn parse_stamp(s: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>, XmltvError> {
    if let Ok(dt) = DateTime::parse_from_str(s, STAMP_FORMAT) {
        return Ok(dt);
    }
    // Offset-less stamps are legal XMLTV; interpret them in the grabber's
    // configured offset.
    chrono::NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S")
        .ok()
        .and_then(|naive| {
            use chrono::TimeZone;
            offset.from_local_datetime(&naive).single()
        })
        .ok_or_else(|| XmltvError::InvalidTimestamp(s.to_string()))
}

fn write_text_element<W: io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<(), XmltvError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
