//! XPath evaluation over XML bodies.

use sxd_document::parser;
use sxd_xpath::{evaluate_xpath, Factory, Value};

/// Check that an XPath expression parses.
pub fn validate_xpath(expression: &str) -> Result<(), String> {
    match Factory::new().build(expression) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err("empty expression".to_string()),
        Err(e) => Err(format!("{e:?}")),
    }
}

/// Evaluate `expression` against `xml`.
///
/// A boolean result is used as is; a node set matches when non-empty, a
/// string when non-empty and a number when non-zero.
pub fn xpath_matches(xml: &str, expression: &str) -> Result<bool, String> {
    let package = parser::parse(xml).map_err(|e| format!("{e:?}"))?;
    let document = package.as_document();

    let value = evaluate_xpath(&document, expression).map_err(|e| format!("{e:?}"))?;
    Ok(match value {
        Value::Boolean(b) => b,
        Value::Nodeset(nodes) => nodes.iter().next().is_some(),
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n != 0.0 && !n.is_nan(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_nodeset() {
        let xml = r#"<order><customer><name>Alice</name></customer></order>"#;
        assert_eq!(xpath_matches(xml, "/order/customer/name"), Ok(true));
        assert_eq!(xpath_matches(xml, "/order/missing"), Ok(false));
    }

    #[test]
    fn test_xpath_boolean() {
        let xml = r#"<order><customer><name>Alice</name></customer></order>"#;
        assert_eq!(
            xpath_matches(xml, "/order/customer/name/text() = 'Alice'"),
            Ok(true)
        );
        assert_eq!(
            xpath_matches(xml, "/order/customer/name/text() = 'Bob'"),
            Ok(false)
        );
    }

    #[test]
    fn test_xpath_attribute() {
        let xml = r#"<root><item id="123">Content</item></root>"#;
        assert_eq!(xpath_matches(xml, "/root/item[@id='123']"), Ok(true));
    }

    #[test]
    fn test_xpath_invalid_xml() {
        assert!(xpath_matches("not xml at all", "/root").is_err());
    }

    #[test]
    fn test_validate_xpath() {
        assert!(validate_xpath("/root/item").is_ok());
        assert!(validate_xpath("/root/[").is_err());
    }
}
