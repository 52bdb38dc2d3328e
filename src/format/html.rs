//! Tagged markup: an HTML subset.
//!
//! Export writes one element per block with inline formatting as nested
//! `<strong>`, `<em>`, `<s>` and `<code>`. Import is deliberately lenient
//! about vocabulary (unknown elements are unwrapped, their content kept) but
//! strict about structure: an end tag that does not match the open element,
//! or an element left open at the end of input, is a parse error.

use super::{ContentFormat, Converter, ExternalValue, ParseError, expect_text};
use crate::doc::{Document, NodeKind, Shape, TextFormat, code_language, normalize_inline};

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlConverter;

impl Converter for HtmlConverter {
    fn format(&self) -> ContentFormat {
        ContentFormat::Html
    }

    fn export(&self, doc: &Document) -> ExternalValue {
        ExternalValue::Text(serialize(&doc.block_shapes()))
    }

    fn import(&self, value: &ExternalValue) -> Result<Vec<Shape>, ParseError> {
        parse(expect_text(ContentFormat::Html, value)?)
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "del", "em", "i", "kbd", "mark", "s", "small", "span",
    "strike", "strong", "sub", "sup", "u",
];

const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "template", "title"];

const FORMAT_TAGS: [(TextFormat, &str); 4] = [
    (TextFormat::BOLD, "strong"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::STRIKETHROUGH, "s"),
    (TextFormat::CODE, "code"),
];

pub fn serialize(blocks: &[Shape]) -> String {
    blocks
        .iter()
        .map(serialize_block)
        .collect::<Vec<_>>()
        .join("\n")
}

fn serialize_block(block: &Shape) -> String {
    match &block.kind {
        NodeKind::Paragraph => format!("<p>{}</p>", serialize_inline(&block.children)),
        NodeKind::Heading { level } => {
            let level = (*level).clamp(1, 6);
            format!("<h{level}>{}</h{level}>", serialize_inline(&block.children))
        }
        NodeKind::Quote => format!(
            "<blockquote>{}</blockquote>",
            serialize_inline(&block.children)
        ),
        NodeKind::Code { language } => {
            let text = escape(&block.text_content(), false);
            match language.as_deref().and_then(code_language) {
                // Class tokens cannot hold whitespace.
                Some(language) if language.contains(char::is_whitespace) => format!(
                    "<pre><code data-language=\"{}\">{text}</code></pre>",
                    escape(&language, true)
                ),
                Some(language) => format!(
                    "<pre><code class=\"language-{}\">{text}</code></pre>",
                    escape(&language, true)
                ),
                None => format!("<pre><code>{text}</code></pre>"),
            }
        }
        NodeKind::List { ordered, start } => {
            let items: String = block
                .children
                .iter()
                .map(|item| {
                    let content = match item.kind {
                        NodeKind::ListItem => serialize_inline(&item.children),
                        _ => serialize_inline(std::slice::from_ref(item)),
                    };
                    format!("<li>{content}</li>")
                })
                .collect();
            match (ordered, start) {
                (false, _) => format!("<ul>{items}</ul>"),
                (true, 1) => format!("<ol>{items}</ol>"),
                (true, start) => format!("<ol start=\"{start}\">{items}</ol>"),
            }
        }
        NodeKind::Table => {
            let mut output = String::from("<table>");
            for row in &block.children {
                output.push_str("<tr>");
                for cell in &row.children {
                    let tag = match cell.kind {
                        NodeKind::TableCell { header: true } => "th",
                        _ => "td",
                    };
                    output.push_str(&format!("<{tag}>{}</{tag}>", serialize_inline(&cell.children)));
                }
                output.push_str("</tr>");
            }
            output.push_str("</table>");
            output
        }
        NodeKind::HorizontalRule => "<hr>".to_string(),
        _ => format!("<p>{}</p>", serialize_inline(std::slice::from_ref(block))),
    }
}

fn serialize_inline(children: &[Shape]) -> String {
    let mut output = String::new();
    for child in children {
        write_inline(child, &mut output);
    }
    output
}

fn write_inline(shape: &Shape, output: &mut String) {
    match &shape.kind {
        NodeKind::Text { text, format } => {
            for (flag, tag) in FORMAT_TAGS {
                if format.contains(flag) {
                    output.push_str(&format!("<{tag}>"));
                }
            }
            output.push_str(&escape(text, false));
            for (flag, tag) in FORMAT_TAGS.iter().rev() {
                if format.contains(*flag) {
                    output.push_str(&format!("</{tag}>"));
                }
            }
        }
        NodeKind::LineBreak => output.push_str("<br>"),
        _ => {
            for child in &shape.children {
                write_inline(child, output);
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' if attribute => output.push_str("&quot;"),
            _ => output.push(c),
        }
    }
    output
}

fn decode_entities(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        output.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..]
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..=end]).map(|c| (c, end + 2)));
        match decoded {
            Some((c, consumed)) => {
                output.push(c);
                rest = &rest[consumed..];
            }
            None => {
                output.push('&');
                rest = &rest[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HtmlNode {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<HtmlNode>,
    },
    Text(String),
}

impl HtmlNode {
    fn attr(&self, key: &str) -> Option<&str> {
        match self {
            HtmlNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            HtmlNode::Text(_) => None,
        }
    }

    fn text_content(&self, out: &mut String) {
        match self {
            HtmlNode::Text(text) => out.push_str(text),
            HtmlNode::Element { name, .. } if name == "br" => out.push('\n'),
            HtmlNode::Element { children, .. } => {
                for child in children {
                    child.text_content(out);
                }
            }
        }
    }
}

struct OpenElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<HtmlNode>,
    offset: usize,
}

fn push_node(stack: &mut [OpenElement], root: &mut Vec<HtmlNode>, node: HtmlNode) {
    let siblings = match stack.last_mut() {
        Some(open) => &mut open.children,
        None => root,
    };
    if let HtmlNode::Text(text) = &node
        && let Some(HtmlNode::Text(previous)) = siblings.last_mut()
    {
        previous.push_str(text);
        return;
    }
    siblings.push(node);
}

fn html_error(offset: usize, message: impl Into<String>) -> ParseError {
    ParseError::Html {
        offset,
        message: message.into(),
    }
}

/// Builds the element tree for `input`.
fn parse_dom(input: &str) -> Result<Vec<HtmlNode>, ParseError> {
    let mut root = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        if rest.starts_with("<!--") {
            let end = rest
                .find("-->")
                .ok_or_else(|| html_error(pos, "unterminated comment"))?;
            pos += end + 3;
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest
                .find('>')
                .ok_or_else(|| html_error(pos, "unterminated declaration"))?;
            pos += end + 1;
            continue;
        }
        if let Some(after) = rest.strip_prefix("</") {
            let end = after
                .find('>')
                .ok_or_else(|| html_error(pos, "unterminated end tag"))?;
            let name = after[..end].trim().to_ascii_lowercase();
            pos += end + 3;
            if VOID_ELEMENTS.contains(&name.as_str()) {
                continue;
            }
            match stack.pop() {
                Some(open) if open.name == name => {
                    let element = HtmlNode::Element {
                        name: open.name,
                        attrs: open.attrs,
                        children: open.children,
                    };
                    push_node(&mut stack, &mut root, element);
                }
                Some(open) => {
                    return Err(html_error(
                        pos,
                        format!("</{name}> does not close <{}>", open.name),
                    ));
                }
                None => return Err(html_error(pos, format!("unexpected </{name}>"))),
            }
            continue;
        }
        if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            let (name, attrs, self_closing, consumed) = parse_start_tag(rest, pos)?;
            let tag_offset = pos;
            pos += consumed;
            if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
                let element = HtmlNode::Element {
                    name,
                    attrs,
                    children: Vec::new(),
                };
                push_node(&mut stack, &mut root, element);
            } else {
                stack.push(OpenElement {
                    name,
                    attrs,
                    children: Vec::new(),
                    offset: tag_offset,
                });
            }
            continue;
        }

        // Text runs to the next tag; a `<` that starts no tag is literal.
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let end = rest[first..]
            .find('<')
            .map(|index| index + first)
            .unwrap_or(rest.len());
        push_node(
            &mut stack,
            &mut root,
            HtmlNode::Text(decode_entities(&rest[..end])),
        );
        pos += end;
    }

    if let Some(open) = stack.pop() {
        return Err(html_error(open.offset, format!("<{}> is never closed", open.name)));
    }
    Ok(root)
}

type StartTag = (String, Vec<(String, String)>, bool, usize);

fn parse_start_tag(rest: &str, offset: usize) -> Result<StartTag, ParseError> {
    let bytes = rest.as_bytes();
    let mut index = 1;
    while index < bytes.len() && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'-') {
        index += 1;
    }
    let name = rest[1..index].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        match bytes.get(index) {
            None => return Err(html_error(offset, format!("unterminated <{name}> tag"))),
            Some(b'>') => return Ok((name, attrs, false, index + 1)),
            Some(b'/') if bytes.get(index + 1) == Some(&b'>') => {
                return Ok((name, attrs, true, index + 2));
            }
            Some(b'/') => {
                index += 1;
                continue;
            }
            Some(_) => {}
        }

        let name_start = index;
        while index < bytes.len()
            && !bytes[index].is_ascii_whitespace()
            && !matches!(bytes[index], b'=' | b'>' | b'/')
        {
            index += 1;
        }
        let key = rest[name_start..index].to_ascii_lowercase();
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        if bytes.get(index) != Some(&b'=') {
            attrs.push((key, String::new()));
            continue;
        }
        index += 1;
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        let value = match bytes.get(index) {
            Some(quote @ (b'"' | b'\'')) => {
                let start = index + 1;
                let len = rest[start..]
                    .find(char::from(*quote))
                    .ok_or_else(|| html_error(offset, "unterminated attribute value"))?;
                index = start + len + 1;
                &rest[start..start + len]
            }
            _ => {
                let start = index;
                while index < bytes.len()
                    && !bytes[index].is_ascii_whitespace()
                    && bytes[index] != b'>'
                {
                    index += 1;
                }
                &rest[start..index]
            }
        };
        attrs.push((key, decode_entities(value)));
    }
}

/// Parses HTML into top-level block shapes.
pub fn parse(input: &str) -> Result<Vec<Shape>, ParseError> {
    let dom = parse_dom(input)?;
    let mut blocks = Vec::new();
    blocks_from(&dom, &mut blocks);
    Ok(blocks)
}

fn is_inline_node(node: &HtmlNode) -> bool {
    match node {
        HtmlNode::Text(_) => true,
        HtmlNode::Element { name, .. } => INLINE_ELEMENTS.contains(&name.as_str()),
    }
}

fn blocks_from(nodes: &[HtmlNode], out: &mut Vec<Shape>) {
    let mut pending: Vec<&HtmlNode> = Vec::new();
    for node in nodes {
        if is_inline_node(node) {
            let blank = matches!(node, HtmlNode::Text(text) if text.trim().is_empty());
            if !(blank && pending.is_empty()) {
                pending.push(node);
            }
            continue;
        }
        flush_loose_inline(&mut pending, out);
        block_from(node, out);
    }
    flush_loose_inline(&mut pending, out);
}

/// Wraps inline content found between blocks into a paragraph.
fn flush_loose_inline(pending: &mut Vec<&HtmlNode>, out: &mut Vec<Shape>) {
    while matches!(pending.last(), Some(HtmlNode::Text(text)) if text.trim().is_empty()) {
        pending.pop();
    }
    if pending.is_empty() {
        return;
    }
    let mut children = Vec::new();
    for node in pending.drain(..) {
        inline_from(node, TextFormat::empty(), &mut children);
    }
    out.push(Shape::paragraph(normalize_inline(children)));
}

fn inline_children(children: &[HtmlNode]) -> Vec<Shape> {
    let mut out = Vec::new();
    for child in children {
        inline_from(child, TextFormat::empty(), &mut out);
    }
    normalize_inline(out)
}

fn block_from(node: &HtmlNode, out: &mut Vec<Shape>) {
    let HtmlNode::Element { name, children, .. } = node else {
        return;
    };
    match name.as_str() {
        "p" => out.push(Shape::paragraph(inline_children(children))),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse().unwrap_or(1);
            out.push(Shape::heading(level, inline_children(children)));
        }
        "blockquote" => out.push(Shape::quote(inline_children(children))),
        "pre" => {
            let language = children.iter().find_map(|child| {
                child.attr("data-language").map(str::to_string).or_else(|| {
                    child
                        .attr("class")?
                        .split_whitespace()
                        .find_map(|class| class.strip_prefix("language-"))
                        .map(str::to_string)
                })
            });
            let mut text = String::new();
            node.text_content(&mut text);
            out.push(Shape::code(language.as_deref(), &text));
        }
        "ul" | "ol" => {
            let start = node
                .attr("start")
                .and_then(|start| start.trim().parse().ok())
                .unwrap_or(1);
            let items = children
                .iter()
                .filter(|child| !matches!(child, HtmlNode::Text(text) if text.trim().is_empty()))
                .map(|child| match child {
                    HtmlNode::Element { name, children, .. } if name == "li" => {
                        Shape::list_item(inline_children(children))
                    }
                    other => Shape::list_item(inline_children(std::slice::from_ref(other))),
                })
                .collect();
            out.push(Shape::with_children(
                NodeKind::List {
                    ordered: name == "ol",
                    start: if name == "ol" { start } else { 1 },
                },
                items,
            ));
        }
        "table" => {
            let mut rows = Vec::new();
            collect_rows(children, &mut rows);
            out.push(Shape::with_children(NodeKind::Table, rows));
        }
        "hr" => out.push(Shape::horizontal_rule()),
        skipped if SKIPPED_ELEMENTS.contains(&skipped) => {}
        _ => blocks_from(children, out),
    }
}

fn collect_rows(nodes: &[HtmlNode], rows: &mut Vec<Shape>) {
    for node in nodes {
        let HtmlNode::Element { name, children, .. } = node else {
            continue;
        };
        if name != "tr" {
            collect_rows(children, rows);
            continue;
        }
        let cells = children
            .iter()
            .filter_map(|cell| match cell {
                HtmlNode::Element { name, children, .. } if name == "th" || name == "td" => {
                    Some(Shape::with_children(
                        NodeKind::TableCell {
                            header: name == "th",
                        },
                        inline_children(children),
                    ))
                }
                _ => None,
            })
            .collect();
        rows.push(Shape::with_children(NodeKind::TableRow, cells));
    }
}

fn inline_from(node: &HtmlNode, format: TextFormat, out: &mut Vec<Shape>) {
    match node {
        HtmlNode::Text(text) => out.push(Shape::formatted(text.clone(), format)),
        HtmlNode::Element { name, children, .. } => {
            let flag = match name.as_str() {
                "br" => {
                    out.push(Shape::line_break());
                    return;
                }
                skipped if SKIPPED_ELEMENTS.contains(&skipped) => return,
                "strong" | "b" => TextFormat::BOLD,
                "em" | "i" => TextFormat::ITALIC,
                "s" | "del" | "strike" => TextFormat::STRIKETHROUGH,
                "code" => TextFormat::CODE,
                _ => TextFormat::empty(),
            };
            for child in children {
                inline_from(child, format | flag, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_blocks() {
        let html = serialize(&[
            Shape::heading(1, vec![Shape::text("A & B")]),
            Shape::paragraph(vec![
                Shape::formatted("bold", TextFormat::BOLD | TextFormat::ITALIC),
                Shape::line_break(),
            ]),
            Shape::code(Some("rust"), "a < b"),
        ]);
        assert_eq!(
            html,
            "<h1>A &amp; B</h1>\n<p><strong><em>bold</em></strong><br></p>\n\
             <pre><code class=\"language-rust\">a &lt; b</code></pre>"
        );
    }

    #[test]
    fn test_round_trip_preserves_empty_blocks() {
        let blocks = vec![
            Shape::paragraph(vec![]),
            Shape::quote(vec![Shape::text(" spaced ")]),
            Shape::with_children(
                NodeKind::List {
                    ordered: true,
                    start: 3,
                },
                vec![Shape::list_item(vec![Shape::text("three")])],
            ),
            Shape::table(&[&["h"], &[""]]),
            Shape::horizontal_rule(),
        ];
        assert_eq!(parse(&serialize(&blocks)).unwrap(), blocks);
    }

    #[test]
    fn test_code_language_survives_whitespace() {
        let blocks = vec![
            Shape::code(Some("a b"), "x"),
            Shape::code(Some("c++"), "y"),
            Shape::code(Some("\"q\" & <r>"), ""),
        ];
        let html = serialize(&blocks);
        assert!(html.starts_with("<pre><code data-language=\"a b\">x</code></pre>"));
        assert_eq!(parse(&html).unwrap(), blocks);
    }

    #[test]
    fn test_whitespace_inside_inline_content_is_kept() {
        assert_eq!(
            parse("<p>\n</p>").unwrap(),
            vec![Shape::paragraph(vec![Shape::text("\n")])]
        );
        assert_eq!(
            parse("<ul>\n  <li><b>a</b> <i>b</i></li>\n</ul>").unwrap(),
            vec![Shape::list(
                false,
                vec![Shape::list_item(vec![
                    Shape::formatted("a", TextFormat::BOLD),
                    Shape::text(" "),
                    Shape::formatted("b", TextFormat::ITALIC),
                ])]
            )]
        );
    }

    #[test]
    fn test_unknown_tags_keep_children() {
        let blocks = parse("<div><section><p>a<span>b</span></p></section></div>").unwrap();
        assert_eq!(blocks, vec![Shape::paragraph(vec![Shape::text("ab")])]);
    }

    #[test]
    fn test_loose_inline_becomes_paragraph() {
        let blocks = parse("hello <b>world</b>\n<hr/>").unwrap();
        assert_eq!(
            blocks,
            vec![
                Shape::paragraph(vec![
                    Shape::text("hello "),
                    Shape::formatted("world", TextFormat::BOLD),
                ]),
                Shape::horizontal_rule(),
            ]
        );
    }

    #[test]
    fn test_mismatched_tags_are_errors() {
        assert!(matches!(
            parse("<p><strong>x</p></strong>"),
            Err(ParseError::Html { .. })
        ));
        assert!(matches!(parse("<p>open"), Err(ParseError::Html { offset: 0, .. })));
        assert!(matches!(parse("</p>"), Err(ParseError::Html { .. })));
    }

    #[test]
    fn test_entities_and_table_sections() {
        let blocks = parse(
            "<table><thead><tr><th>&lt;x&gt;</th></tr></thead>\
             <tbody><tr><td>&#65;&#x42;&unknown;</td></tr></tbody></table>",
        )
        .unwrap();
        assert_eq!(
            blocks,
            vec![Shape::with_children(
                NodeKind::Table,
                vec![
                    Shape::with_children(
                        NodeKind::TableRow,
                        vec![Shape::with_children(
                            NodeKind::TableCell { header: true },
                            vec![Shape::text("<x>")],
                        )],
                    ),
                    Shape::with_children(
                        NodeKind::TableRow,
                        vec![Shape::with_children(
                            NodeKind::TableCell { header: false },
                            vec![Shape::text("AB&unknown;")],
                        )],
                    ),
                ],
            )]
        );
    }
}
