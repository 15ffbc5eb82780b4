use std::collections::BTreeMap;

use roxmltree::{Document, Node};

/// Indexed path of an element, lxml `getpath` style: local names joined by
/// `/`, with a `[n]` position only where same-named siblings exist.
pub fn element_path(node: Node) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = node;
    while current.is_element() {
        let name = current.tag_name().name().to_string();
        let segment = match current.parent() {
            Some(parent) => {
                let same: Vec<Node> = parent
                    .children()
                    .filter(|c| c.is_element() && c.tag_name().name() == name)
                    .collect();
                if same.len() > 1 {
                    let idx = same.iter().position(|c| *c == current).unwrap_or(0) + 1;
                    format!("{}[{}]", name, idx)
                } else {
                    name
                }
            }
            None => name,
        };
        segments.push(segment);
        match current.parent() {
            Some(p) if p.is_element() => current = p,
            _ => break,
        }
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// One-time map from every element's path to its source line. All lookups
/// are best-effort: the worst case is an uninformative but valid line 1.
pub struct LineMap {
    map: BTreeMap<String, u32>,
}

impl LineMap {
    pub fn build(doc: &Document) -> Self {
        let mut map = BTreeMap::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            let pos = doc.text_pos_at(node.range().start);
            map.insert(element_path(node), pos.row);
        }
        LineMap { map }
    }

    pub fn empty() -> Self {
        LineMap { map: BTreeMap::new() }
    }

    /// Resolve an XPath to a line: exact match first, then the longest
    /// predicate-stripped substring match (nearest-ancestor heuristic).
    pub fn line_for_xpath(&self, xpath: &str) -> u32 {
        if xpath.is_empty() {
            return 1;
        }
        if let Some(line) = self.map.get(xpath) {
            return *line;
        }

        let simplified = strip_predicates(xpath);
        let mut best: Option<(&str, u32)> = None;
        for (mapped, line) in &self.map {
            let simplified_mapped = strip_predicates(mapped);
            if simplified_mapped.contains(simplified.as_str())
                || simplified.contains(simplified_mapped.as_str())
            {
                match best {
                    Some((prev, _)) if mapped.len() <= prev.len() => {}
                    _ => best = Some((mapped.as_str(), *line)),
                }
            }
        }
        best.map(|(_, line)| line).unwrap_or(1)
    }

    /// Resolve a reported location string (e.g. a schematron location),
    /// falling back to `[n]` position indicators as a rough hint.
    pub fn line_for_location(&self, location: &str) -> u32 {
        if location.is_empty() {
            return 1;
        }
        let line = self.line_for_xpath(location);
        if line > 1 {
            return line;
        }
        position_hint(location).unwrap_or(1)
    }

    /// Extract a line from a parser/engine error message (`line N`, `:N:`),
    /// falling back to the XPath lookup.
    pub fn line_for_parser_error(&self, message: &str, xpath: &str) -> u32 {
        if let Some(line) = message_line_hint(message) {
            return line;
        }
        if !xpath.is_empty() {
            return self.line_for_xpath(xpath);
        }
        1
    }
}

/// Remove every `[...]` predicate, bracket-depth aware.
fn strip_predicates(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Largest `[n]` position index in a location string, used as a last-resort
/// line hint. Position does not map directly to a line; this is approximate.
fn position_hint(location: &str) -> Option<u32> {
    let mut max: Option<u32> = None;
    let bytes = location.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            let mut j = i + 1;
            let mut value: u64 = 0;
            let mut digits = 0;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                value = value * 10 + (bytes[j] - b'0') as u64;
                digits += 1;
                j += 1;
            }
            if digits > 0 && j < bytes.len() && bytes[j] == b']' {
                let v = value.min(u32::MAX as u64) as u32;
                if max.map_or(true, |m| v > m) {
                    max = Some(v);
                }
            }
            i = j;
        } else {
            i += 1;
        }
    }
    max.map(|m| m.max(1))
}

/// Scan `line N` / `Line N` / `:N:` patterns in an error message.
fn message_line_hint(message: &str) -> Option<u32> {
    let lower = message.to_lowercase();
    if let Some(idx) = lower.find("line ") {
        if let Some(n) = leading_number(&message[idx + 5..]) {
            return Some(n);
        }
    }
    // ":N:" style positions
    let bytes = message.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b':' {
            if let Some(n) = leading_number(&message[i + 1..]) {
                let digits = n.to_string().len();
                if message[i + 1..].as_bytes().get(digits) == Some(&b':') {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<ONIX>\n  <Product>\n    <Title>A</Title>\n  </Product>\n  <Product>\n    <Title>B</Title>\n  </Product>\n</ONIX>";

    #[test]
    fn exact_path_lookup() {
        let doc = Document::parse(SAMPLE).unwrap();
        let map = LineMap::build(&doc);
        assert_eq!(map.line_for_xpath("/ONIX/Product[1]"), 2);
        assert_eq!(map.line_for_xpath("/ONIX/Product[2]"), 5);
        assert_eq!(map.line_for_xpath("/ONIX/Product[2]/Title"), 6);
    }

    #[test]
    fn predicate_stripped_nearest_match() {
        let doc = Document::parse(SAMPLE).unwrap();
        let map = LineMap::build(&doc);
        // Unknown predicate content still resolves via the stripped form.
        let line = map.line_for_xpath("/ONIX/Product[last()]/Title");
        assert!(line >= 2);
    }

    #[test]
    fn unknown_path_defaults_to_one() {
        let doc = Document::parse("<a/>").unwrap();
        let map = LineMap::build(&doc);
        assert_eq!(map.line_for_xpath("/nothing/here"), 1);
    }

    #[test]
    fn position_indicator_fallback() {
        let map = LineMap::empty();
        assert_eq!(map.line_for_location("/*:ONIXMessage[1]/*:Product[7]"), 7);
        assert_eq!(map.line_for_location(""), 1);
    }

    #[test]
    fn parser_error_line_hint() {
        let map = LineMap::empty();
        assert_eq!(map.line_for_parser_error("error at line 42: bad tag", ""), 42);
        assert_eq!(map.line_for_parser_error("book.xml:17: unexpected", ""), 17);
        assert_eq!(map.line_for_parser_error("no hint here", ""), 1);
    }

    #[test]
    fn element_path_indexes_repeated_siblings_only() {
        let doc = Document::parse("<r><a/><b/><a/></r>").unwrap();
        let root = doc.root_element();
        let paths: Vec<String> = root
            .children()
            .filter(|n| n.is_element())
            .map(element_path)
            .collect();
        assert_eq!(paths, vec!["/r/a[1]", "/r/b", "/r/a[2]"]);
    }
}
