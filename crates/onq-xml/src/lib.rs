pub mod detect;
pub mod lines;
pub mod xpath;

pub use detect::*;
pub use lines::*;
pub use xpath::*;

pub use roxmltree;

/// XPath 1.0 string-value of a node: text content for text nodes,
/// concatenated descendant text for elements, empty otherwise.
pub fn node_string(node: roxmltree::Node) -> String {
    if node.is_text() {
        return node.text().unwrap_or("").to_string();
    }
    let mut out = String::new();
    for d in node.descendants() {
        if d.is_text() {
            if let Some(t) = d.text() {
                out.push_str(t);
            }
        }
    }
    out
}
