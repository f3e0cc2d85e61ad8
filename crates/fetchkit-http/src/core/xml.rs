//! XML documents decoded into nested JSON values.
//!
//! The root element is unwrapped: the result describes its content.
//! - an element with only text becomes a string
//! - an element with children becomes an object keyed by child name
//! - repeated child names collapse into an array
//! - attributes are collected under `@attributes`; the text of an element
//!   that also has attributes is kept under `@text`
//!
//! CDATA sections are treated as text.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("xml parse: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("document has no root element")]
    NoRoot,
    #[error("unbalanced closing tag")]
    Unbalanced,
    #[error("document has more than one root element")]
    MultipleRoots,
}

#[derive(Default)]
struct Node {
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Node {
    fn open(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let mut node = Node::default();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attributes.insert(key, Value::String(value));
        }
        Ok(node)
    }

    fn attach(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim().to_string();
        if self.children.is_empty() && self.attributes.is_empty() {
            return Value::String(text);
        }

        let mut map = Map::new();
        if !self.attributes.is_empty() {
            map.insert("@attributes".to_string(), Value::Object(self.attributes));
        }
        if self.children.is_empty() && !text.is_empty() {
            map.insert("@text".to_string(), Value::String(text));
        }
        map.extend(self.children);
        Value::Object(map)
    }
}

fn element_name(start: &BytesStart<'_>) -> String { String::from_utf8_lossy(start.name().as_ref()).into_owned() }

fn set_root(root: &mut Option<Value>, value: Value) -> Result<(), XmlError> {
    if root.is_some() {
        return Err(XmlError::MultipleRoots);
    }
    *root = Some(value);
    Ok(())
}

pub fn decode(input: &str) -> Result<Value, XmlError> {
    let mut reader = Reader::from_str(input.trim());
    reader.trim_text(true);

    let mut stack: Vec<(String, Node)> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let node = Node::open(&e)?;
                stack.push((element_name(&e), node));
            }
            Event::Empty(e) => {
                let value = Node::open(&e)?.into_value();
                match stack.last_mut() {
                    Some((_, parent)) => parent.attach(element_name(&e), value),
                    None => set_root(&mut root, value)?,
                }
            }
            Event::Text(t) => {
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let (name, node) = stack.pop().ok_or(XmlError::Unbalanced)?;
                let value = node.into_value();
                match stack.last_mut() {
                    Some((_, parent)) => parent.attach(name, value),
                    None => set_root(&mut root, value)?,
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or(XmlError::NoRoot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_document() {
        let v = decode("<?xml version=\"1.0\"?><xml><code>SUCCESS</code><n>1</n></xml>").unwrap();
        assert_eq!(v, json!({"code": "SUCCESS", "n": "1"}));
    }

    #[test]
    fn test_cdata_as_text() {
        let v = decode("<xml><return_msg><![CDATA[OK & fine]]></return_msg></xml>").unwrap();
        assert_eq!(v["return_msg"], "OK & fine");
    }

    #[test]
    fn test_repeated_children_become_array() {
        let v = decode("<list><item>a</item><item>b</item><item>c</item></list>").unwrap();
        assert_eq!(v["item"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_nested_and_attributes() {
        let v = decode(r#"<r><user id="7"><name>kim</name></user><flag on="1"/></r>"#).unwrap();
        assert_eq!(v["user"]["@attributes"]["id"], "7");
        assert_eq!(v["user"]["name"], "kim");
        assert_eq!(v["flag"], json!({"@attributes": {"on": "1"}}));
    }

    #[test]
    fn test_text_with_attributes() {
        let v = decode(r#"<r><price currency="EUR">9.50</price></r>"#).unwrap();
        assert_eq!(v["price"]["@text"], "9.50");
        assert_eq!(v["price"]["@attributes"]["currency"], "EUR");
    }

    #[test]
    fn test_entities_unescaped() {
        let v = decode("<r><q>a &lt; b</q></r>").unwrap();
        assert_eq!(v["q"], "a < b");
    }

    #[test]
    fn test_text_only_root() {
        assert_eq!(decode("<greeting>hi</greeting>").unwrap(), json!("hi"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(decode(""), Err(XmlError::NoRoot)));
        assert!(decode("<a><b></a>").is_err());
    }

    #[test]
    fn test_second_root_rejected() {
        assert!(matches!(decode("<a>1</a><b>2</b>"), Err(XmlError::MultipleRoots)));
        assert!(matches!(decode("<a>1</a><b/>"), Err(XmlError::MultipleRoots)));
    }
}
