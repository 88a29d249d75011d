//! XML serialization of a [`Document`].

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;

use crate::{Document, DocumentError};

pub(crate) fn write(document: &Document) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut root = BytesStart::new("Document");
    root.push_attribute(("namespace", document.namespace.as_str()));
    root.push_attribute(("effective", document.effective.as_str()));
    root.push_attribute(("region", document.region.as_str()));
    emit(&mut writer, Event::Start(root))?;

    for feature in &document.features {
        let mut start = BytesStart::new("Feature");
        start.push_attribute(("type", feature.kind()));
        start.push_attribute(("id", feature.id()));
        if let Some(source) = feature.source() {
            start.push_attribute(("source", source));
        }
        emit(&mut writer, Event::Start(start))?;

        for (name, value) in feature.fields() {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let mut field = BytesStart::new("field");
            field.push_attribute(("name", name.as_str()));
            emit(&mut writer, Event::Start(field))?;
            emit(&mut writer, Event::Text(BytesText::new(&text)))?;
            emit(&mut writer, Event::End(BytesEnd::new("field")))?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("Feature")))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("Document")))?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| DocumentError::Xml(e.to_string()))
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), DocumentError> {
    writer
        .write_event(event)
        .map_err(|e| DocumentError::Xml(e.to_string()))
}
