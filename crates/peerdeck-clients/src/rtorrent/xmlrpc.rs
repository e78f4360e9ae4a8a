//! Minimal XML-RPC codec for the rTorrent dialect.
//!
//! Covers exactly what the adapter needs: scalar/array/struct parameters
//! out, scalar/array results back, faults surfaced as errors.

use anyhow::{bail, Context};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;

/// The value shapes exchanged with rTorrent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum XmlRpcValue {
    /// Integer (`i4`/`i8`/`int`).
    Int(i64),
    /// String (typed or bare text).
    Str(String),
    /// Array of values.
    Array(Vec<XmlRpcValue>),
    /// Struct, used only for `system.multicall` requests.
    Struct(Vec<(String, XmlRpcValue)>),
}

impl XmlRpcValue {
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Str(value) => value.parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn as_array(&self) -> Option<&[XmlRpcValue]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn write_value(out: &mut String, value: &XmlRpcValue) {
    out.push_str("<value>");
    match value {
        XmlRpcValue::Int(number) => {
            out.push_str(&format!("<i8>{number}</i8>"));
        }
        XmlRpcValue::Str(text) => {
            out.push_str(&format!("<string>{}</string>", escape(text)));
        }
        XmlRpcValue::Array(values) => {
            out.push_str("<array><data>");
            for item in values {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        XmlRpcValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str(&format!("<member><name>{}</name>", escape(name)));
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Render one `methodCall` document.
pub(crate) fn build_call(method: &str, params: &[XmlRpcValue]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Parse a `methodResponse` document into its single return value.
///
/// # Errors
///
/// Fails on faults and on documents the reduced grammar cannot parse.
pub(crate) fn parse_response(xml: &str) -> anyhow::Result<XmlRpcValue> {
    if xml.contains("<fault>") {
        bail!("xml-rpc fault: {}", fault_string(xml));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Stack frame per open <value>; arrays collect finished children.
    let mut array_stack: Vec<Vec<XmlRpcValue>> = Vec::new();
    let mut value_depth: usize = 0;
    let mut pending_text: Option<String> = None;
    let mut pending_child: Option<XmlRpcValue> = None;
    let mut result: Option<XmlRpcValue> = None;

    loop {
        match reader.read_event().context("xml-rpc parse error")? {
            XmlEvent::Start(start) => match start.name().as_ref() {
                b"value" => {
                    value_depth += 1;
                    pending_text = None;
                }
                b"array" => {
                    array_stack.push(Vec::new());
                }
                _ => {}
            },
            XmlEvent::Text(text) => {
                let decoded = text.decode().context("xml-rpc text decode error")?;
                pending_text = Some(decoded.into_owned());
            }
            XmlEvent::End(end) => match end.name().as_ref() {
                b"array" => {
                    let values = array_stack.pop().context("unbalanced <array>")?;
                    pending_child = Some(XmlRpcValue::Array(values));
                }
                b"value" => {
                    if value_depth == 0 {
                        bail!("unbalanced <value>");
                    }
                    value_depth -= 1;
                    let value = if let Some(child) = pending_child.take() {
                        child
                    } else {
                        let text = pending_text.take().unwrap_or_default();
                        match text.parse::<i64>() {
                            Ok(number) if !text.is_empty() => XmlRpcValue::Int(number),
                            _ => XmlRpcValue::Str(text),
                        }
                    };
                    if let Some(open_array) = array_stack.last_mut() {
                        open_array.push(value);
                    } else {
                        result = Some(value);
                    }
                }
                _ => {}
            },
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    result.context("xml-rpc response carried no value")
}

fn fault_string(xml: &str) -> String {
    xml.find("faultString")
        .and_then(|_| {
            let start = xml.find("<string>")? + "<string>".len();
            let end = xml[start..].find("</string>")? + start;
            Some(xml[start..end].to_string())
        })
        .unwrap_or_else(|| "unknown fault".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_scalar_and_array_calls() {
        let call = build_call(
            "d.multicall2",
            &[
                XmlRpcValue::Str(String::new()),
                XmlRpcValue::Str("main".to_string()),
                XmlRpcValue::Str("d.hash=".to_string()),
            ],
        );
        assert!(call.contains("<methodName>d.multicall2</methodName>"));
        assert!(call.contains("<string>main</string>"));
    }

    #[test]
    fn escapes_markup_in_strings() {
        let call = build_call("m", &[XmlRpcValue::Str("<a&b>".to_string())]);
        assert!(call.contains("&lt;a&amp;b&gt;"));
    }

    #[test]
    fn parses_scalar_response() {
        let value = parse_response(
            "<?xml version=\"1.0\"?><methodResponse><params><param>\
             <value><string>0.9.8</string></value>\
             </param></params></methodResponse>",
        )
        .unwrap();
        assert_eq!(value.as_str(), Some("0.9.8"));
    }

    #[test]
    fn parses_nested_arrays() {
        let value = parse_response(
            "<?xml version=\"1.0\"?><methodResponse><params><param><value><array><data>\
             <value><array><data>\
             <value><string>HASH</string></value>\
             <value><i8>42</i8></value>\
             </data></array></value>\
             </data></array></value></param></params></methodResponse>",
        )
        .unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        let row = rows[0].as_array().unwrap();
        assert_eq!(row[0].as_str(), Some("HASH"));
        assert_eq!(row[1].as_i64(), Some(42));
    }

    #[test]
    fn faults_become_errors() {
        let err = parse_response(
            "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
             <member><name>faultString</name><value><string>Unsupported method</string></value>\
             </member></struct></value></fault></methodResponse>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported method"));
    }

    #[test]
    fn untyped_numeric_text_is_int() {
        let value = parse_response(
            "<?xml version=\"1.0\"?><methodResponse><params><param>\
             <value>17</value>\
             </param></params></methodResponse>",
        )
        .unwrap();
        assert_eq!(value.as_i64(), Some(17));
    }
}
