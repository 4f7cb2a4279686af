//! Markup output for generated instances
//!
//! Writes an XML declaration followed by the tree, indented by two spaces.
//! Leaf text stays on the line of its element, and elements without content
//! are written as an open/close pair rather than a self-closing tag.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Error, Result};
use crate::instance::Node;

fn xml_error(err: quick_xml::Error) -> Error {
    Error::Xml(err.to_string())
}

/// Render an instance tree as a document
pub fn serialize(root: &Node) -> Result<String> {
    let mut buffer = Vec::new();
    serialize_into(root, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::Xml(e.to_string()))
}

/// Write an instance tree as a document to `out`
pub fn serialize_into<W: Write>(root: &Node, out: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    write_node(&mut writer, root)?;
    writer.get_mut().write_all(b"\n")?;
    Ok(())
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &Node) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (name, value) in &node.attributes {
        start.push_attribute((name.as_str(), value.as_str()));
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;

    match &node.text {
        Some(text) => writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?,
        // An empty text event keeps the end tag on the same line
        None if node.children.is_empty() => writer
            .write_event(Event::Text(BytesText::new("")))
            .map_err(xml_error)?,
        None => {}
    }
    for child in &node.children {
        write_node(writer, child)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
        .map_err(xml_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(name: &str, text: &str) -> Node {
        Node {
            text: Some(text.to_string()),
            ..Node::new(name)
        }
    }

    #[test]
    fn test_declaration_and_indent() {
        let mut root = Node::new("order");
        root.push_attribute("id", "1");
        root.children.push(leaf("item", "pen"));
        root.children.push(Node::new("note"));
        let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                        <order id=\"1\">\n  \
                          <item>pen</item>\n  \
                          <note></note>\n\
                        </order>\n";
        assert_eq!(serialize(&root).unwrap(), expected);
    }

    #[test]
    fn test_escaping() {
        let mut root = leaf("t", "a < b & c");
        root.push_attribute("q", "say \"hi\" & <bye>");
        let text = serialize(&root).unwrap();
        assert!(text.contains("a &lt; b &amp; c"));
        assert!(text.contains("say &quot;hi&quot; &amp; &lt;bye&gt;"));
    }

    #[test]
    fn test_empty_root_is_a_pair() {
        let text = serialize(&Node::new("empty")).unwrap();
        assert!(text.ends_with("<empty></empty>\n"));
        assert!(!text.contains("/>"));
    }
}
