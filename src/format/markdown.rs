//! Structured markup: a line-based markdown dialect.
//!
//! Blocks are separated by one blank line. Inline formatting uses toggle
//! markers (`**` bold, `*` italic, `~~` strikethrough, `` ` `` code); the
//! serializer only emits the markers whose state changes between runs and
//! closes everything at the end of a block. A hard line break is a trailing
//! backslash, or `<br>` inside headings and table cells. Every character
//! that could be mistaken for syntax is backslash-escaped, which makes
//! `export → import → export` stable for any document built from the baseline
//! node set. Empty paragraphs carry no text and are dropped.

use super::{ContentFormat, Converter, ExternalValue, ParseError, expect_text};
use crate::doc::{Document, NodeKind, Shape, TextFormat, code_language, normalize_inline};

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownConverter;

impl Converter for MarkdownConverter {
    fn format(&self) -> ContentFormat {
        ContentFormat::Markdown
    }

    fn export(&self, doc: &Document) -> ExternalValue {
        ExternalValue::Text(serialize(&doc.block_shapes()))
    }

    fn import(&self, value: &ExternalValue) -> Result<Vec<Shape>, ParseError> {
        Ok(parse(expect_text(ContentFormat::Markdown, value)?))
    }
}

/// Characters escaped wherever they appear in text.
const ESCAPED: &[char] = &['\\', '*', '_', '`', '~', '#', '>', '|', '[', ']', '<'];

const MARKERS: [(TextFormat, &str); 4] = [
    (TextFormat::BOLD, "**"),
    (TextFormat::ITALIC, "*"),
    (TextFormat::STRIKETHROUGH, "~~"),
    (TextFormat::CODE, "`"),
];

pub fn serialize(blocks: &[Shape]) -> String {
    let rendered: Vec<String> = blocks.iter().filter_map(serialize_block).collect();
    rendered.join("\n\n")
}

fn serialize_block(block: &Shape) -> Option<String> {
    match &block.kind {
        NodeKind::Heading { level } => {
            let hashes = "#".repeat(usize::from((*level).clamp(1, 6)));
            let text = serialize_inline(&block.children, Breaks::Tag);
            if text.is_empty() {
                Some(hashes)
            } else {
                Some(format!("{hashes} {text}"))
            }
        }
        NodeKind::Quote => {
            let text = serialize_inline(&block.children, Breaks::Backslash(""));
            if text.is_empty() {
                return Some(">".to_string());
            }
            Some(
                text.split('\n')
                    .map(|line| format!("> {line}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
        NodeKind::Code { language } => {
            let text = block.text_content();
            let fence = "`".repeat((longest_backtick_run(&text) + 1).max(3));
            let mut output = fence.clone();
            // A backtick in the info string would stop the line opening a fence.
            if let Some(language) = language.as_deref().and_then(code_language) {
                output.push_str(&language);
            }
            output.push('\n');
            if !text.is_empty() {
                output.push_str(&text);
                output.push('\n');
            }
            output.push_str(&fence);
            Some(output)
        }
        NodeKind::List { ordered, start } => {
            let mut lines = Vec::with_capacity(block.children.len());
            for (index, item) in block.children.iter().enumerate() {
                let marker = if *ordered {
                    format!("{}. ", u64::from(*start) + index as u64)
                } else {
                    "- ".to_string()
                };
                let indent = " ".repeat(marker.len());
                let content = match item.kind {
                    NodeKind::ListItem => item.children.as_slice(),
                    _ => std::slice::from_ref(item),
                };
                let text = serialize_inline(content, Breaks::Backslash(&indent));
                if text.is_empty() {
                    lines.push(marker.trim_end().to_string());
                } else {
                    lines.push(format!("{marker}{text}"));
                }
            }
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        NodeKind::Table => serialize_table(block),
        NodeKind::HorizontalRule => Some("---".to_string()),
        NodeKind::Paragraph => {
            let text = serialize_inline(&block.children, Breaks::Backslash(""));
            (!text.is_empty()).then_some(text)
        }
        // Stray inline or structural nodes at the top level render as a paragraph.
        _ => {
            let text = serialize_inline(std::slice::from_ref(block), Breaks::Backslash(""));
            (!text.is_empty()).then_some(text)
        }
    }
}

fn serialize_table(table: &Shape) -> Option<String> {
    let rows: Vec<Vec<String>> = table
        .children
        .iter()
        .map(|row| {
            row.children
                .iter()
                .map(|cell| serialize_inline(&cell.children, Breaks::Tag))
                .collect()
        })
        .collect();
    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return None;
    }

    let mut output = Vec::with_capacity(rows.len() + 1);
    for (index, mut row) in rows.into_iter().enumerate() {
        row.resize(col_count, String::new());
        output.push(format!("| {} |", row.join(" | ")));
        if index == 0 {
            output.push(format!("| {} |", vec!["---"; col_count].join(" | ")));
        }
    }
    Some(output.join("\n"))
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[derive(Debug, Clone, Copy)]
enum Breaks<'a> {
    /// Trailing backslash, continuation lines prefixed with the indent.
    Backslash(&'a str),
    /// `<br>`, for single-line contexts.
    Tag,
}

fn serialize_inline(children: &[Shape], breaks: Breaks<'_>) -> String {
    let mut writer = InlineWriter {
        out: String::new(),
        open: TextFormat::empty(),
        line_start: matches!(breaks, Breaks::Backslash(_)),
        pending_break: false,
        breaks,
    };
    for child in children {
        writer.shape(child);
    }
    writer.finish()
}

struct InlineWriter<'a> {
    out: String,
    open: TextFormat,
    line_start: bool,
    // The last break of a block is written without a newline.
    pending_break: bool,
    breaks: Breaks<'a>,
}

impl InlineWriter<'_> {
    fn shape(&mut self, shape: &Shape) {
        match &shape.kind {
            NodeKind::Text { text, format } => self.text(text, *format),
            NodeKind::LineBreak => self.line_break(),
            _ => {
                for child in &shape.children {
                    self.shape(child);
                }
            }
        }
    }

    fn line_break(&mut self) {
        match self.breaks {
            Breaks::Tag => self.out.push_str("<br>"),
            Breaks::Backslash(_) => {
                self.flush_break();
                self.pending_break = true;
            }
        }
    }

    fn flush_break(&mut self) {
        if !std::mem::take(&mut self.pending_break) {
            return;
        }
        if let Breaks::Backslash(indent) = self.breaks {
            self.out.push_str("\\\n");
            self.out.push_str(indent);
            self.line_start = true;
        }
    }

    fn toggle_to(&mut self, target: TextFormat) {
        let changed = TextFormat::from_bits(self.open.bits() ^ target.bits());
        for (flag, marker) in MARKERS {
            if changed.contains(flag) {
                self.out.push_str(marker);
            }
        }
        self.open = target;
    }

    fn text(&mut self, text: &str, format: TextFormat) {
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\n' => {
                    self.line_break();
                    continue;
                }
                '\r' => continue,
                _ => {}
            }
            self.flush_break();
            self.toggle_to(format);

            if std::mem::take(&mut self.line_start) {
                if c.is_whitespace() || c == '-' || c == '+' {
                    self.out.push('\\');
                    self.out.push(c);
                    continue;
                }
                if c.is_ascii_digit() {
                    self.out.push(c);
                    while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                        self.out.push(digit);
                    }
                    if chars.next_if_eq(&'.').is_some() {
                        self.out.push_str("\\.");
                    }
                    continue;
                }
            }
            if ESCAPED.contains(&c) {
                self.out.push('\\');
            }
            self.out.push(c);
        }
    }

    fn finish(mut self) -> String {
        self.toggle_to(TextFormat::empty());
        if self.pending_break {
            self.out.push('\\');
        }
        self.out
    }
}

/// Parses markdown text into top-level block shapes. Never fails: anything
/// that is not recognised as block syntax is paragraph text.
pub fn parse(input: &str) -> Vec<Shape> {
    let lines: Vec<&str> = input
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let mut blocks = Vec::new();
    parse_blocks(&lines, &mut blocks);
    blocks
}

fn parse_blocks(lines: &[&str], out: &mut Vec<Shape>) {
    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            index += 1;
            continue;
        }

        if let Some(fence_len) = fence_length(trimmed) {
            let info = trimmed[fence_len..].trim();
            let mut contents: Vec<&str> = Vec::new();
            let mut end_index = index + 1;
            while end_index < lines.len() {
                if closes_fence(lines[end_index], fence_len) {
                    break;
                }
                contents.push(lines[end_index]);
                end_index += 1;
            }
            out.push(Shape::code(Some(info), &contents.join("\n")));
            index = (end_index + 1).min(lines.len());
            continue;
        }

        if is_rule(trimmed) {
            out.push(Shape::horizontal_rule());
            index += 1;
            continue;
        }

        if let Some((level, rest)) = heading(trimmed) {
            out.push(Shape::heading(level, parse_inline(rest)));
            index += 1;
            continue;
        }

        if trimmed.starts_with('>') {
            let mut quote_lines: Vec<&str> = Vec::new();
            let mut end_index = index;
            while end_index < lines.len() {
                let Some(stripped) = lines[end_index].trim_start().strip_prefix('>') else {
                    break;
                };
                quote_lines.push(stripped.strip_prefix(' ').unwrap_or(stripped));
                end_index += 1;
            }
            out.push(Shape::quote(parse_inline(&quote_lines.join("\n"))));
            index = end_index;
            continue;
        }

        if trimmed.starts_with('|') {
            let mut end_index = index;
            while end_index < lines.len() && lines[end_index].trim_start().starts_with('|') {
                end_index += 1;
            }
            out.push(parse_table(&lines[index..end_index]));
            index = end_index;
            continue;
        }

        if let Some(first) = list_marker(trimmed) {
            index = parse_list(lines, index, first, out);
            continue;
        }

        let mut paragraph_lines: Vec<&str> = Vec::new();
        let mut end_index = index;
        while end_index < lines.len() {
            let current = lines[end_index];
            if end_index > index && starts_block(current.trim_start()) {
                break;
            }
            paragraph_lines.push(current);
            end_index += 1;
        }
        let children = parse_inline(&paragraph_lines.join("\n"));
        if !children.is_empty() {
            out.push(Shape::paragraph(children));
        }
        index = end_index;
    }
}

fn starts_block(trimmed: &str) -> bool {
    trimmed.is_empty()
        || fence_length(trimmed).is_some()
        || is_rule(trimmed)
        || heading(trimmed).is_some()
        || trimmed.starts_with('>')
        || trimmed.starts_with('|')
        || list_marker(trimmed).is_some()
}

fn fence_length(trimmed: &str) -> Option<usize> {
    let count = trimmed.chars().take_while(|c| *c == '`').count();
    (count >= 3 && !trimmed[count..].contains('`')).then_some(count)
}

fn closes_fence(line: &str, fence_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= fence_len && trimmed.chars().all(|c| c == '`')
}

fn is_rule(trimmed: &str) -> bool {
    let rule = trimmed.trim_end();
    rule.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| rule.chars().all(|c| c == *marker))
}

fn heading(trimmed: &str) -> Option<(u8, &str)> {
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if rest.is_empty() {
        return Some((level as u8, rest));
    }
    rest.strip_prefix(' ')
        .or_else(|| rest.strip_prefix('\t'))
        .map(|rest| (level as u8, rest))
}

#[derive(Debug, Clone, Copy)]
struct ListMarker<'a> {
    ordered: bool,
    number: u32,
    width: usize,
    rest: &'a str,
}

fn list_marker(trimmed: &str) -> Option<ListMarker<'_>> {
    if trimmed == "-" {
        return Some(ListMarker {
            ordered: false,
            number: 1,
            width: 2,
            rest: "",
        });
    }
    if let Some(rest) = trimmed.strip_prefix("- ") {
        return Some(ListMarker {
            ordered: false,
            number: 1,
            width: 2,
            rest,
        });
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let number: u32 = trimmed[..digits].parse().ok()?;
    let after = &trimmed[digits..];
    let rest = if after == "." {
        ""
    } else {
        after.strip_prefix(". ")?
    };
    Some(ListMarker {
        ordered: true,
        number,
        width: digits + 2,
        rest,
    })
}

fn parse_list(lines: &[&str], index: usize, first: ListMarker<'_>, out: &mut Vec<Shape>) -> usize {
    let mut items: Vec<String> = Vec::new();
    let mut width = first.width;
    let mut end_index = index;
    while end_index < lines.len() {
        let line = lines[end_index];
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            break;
        }
        if let Some(marker) = list_marker(trimmed) {
            if marker.ordered != first.ordered {
                break;
            }
            items.push(marker.rest.to_string());
            width = marker.width;
            end_index += 1;
            continue;
        }
        let spaces = line.bytes().take_while(|b| *b == b' ').count();
        match items.last_mut() {
            Some(item) if spaces > 0 => {
                item.push('\n');
                item.push_str(&line[spaces.min(width)..]);
                end_index += 1;
            }
            _ => break,
        }
    }

    let children = items
        .iter()
        .map(|item| Shape::list_item(parse_inline(item)))
        .collect();
    out.push(Shape::with_children(
        NodeKind::List {
            ordered: first.ordered,
            start: if first.ordered { first.number } else { 1 },
        },
        children,
    ));
    end_index
}

fn parse_table(lines: &[&str]) -> Shape {
    let mut rows = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if index == 1 && is_align_row(line) {
            continue;
        }
        let header = rows.is_empty();
        let cells = split_cells(line)
            .iter()
            .map(|cell| {
                Shape::with_children(NodeKind::TableCell { header }, parse_inline(cell))
            })
            .collect();
        rows.push(Shape::with_children(NodeKind::TableRow, cells));
    }
    Shape::with_children(NodeKind::Table, rows)
}

/// Cell sources of one table row, still escaped, with the single space of
/// padding on each side removed.
fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = line.trim().chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    if !cells.is_empty() {
        cells.remove(0);
    }
    if cells.last().is_some_and(String::is_empty) {
        cells.pop();
    }
    cells
        .into_iter()
        .map(|cell| {
            let cell = cell.strip_prefix(' ').unwrap_or(&cell);
            cell.strip_suffix(' ').unwrap_or(cell).to_string()
        })
        .collect()
}

fn is_align_row(line: &str) -> bool {
    let cells = split_cells(line);
    !cells.is_empty()
        && cells.iter().all(|cell| {
            let cell = cell.trim();
            cell.contains('-') && cell.chars().all(|c| c == '-' || c == ':')
        })
}

/// Parses inline markup into normalized text runs and line breaks.
pub fn parse_inline(source: &str) -> Vec<Shape> {
    let mut out = Vec::new();
    let mut buffer = String::new();
    let mut format = TextFormat::empty();
    let mut rest = source;

    fn flush(out: &mut Vec<Shape>, buffer: &mut String, format: TextFormat) {
        if !buffer.is_empty() {
            out.push(Shape::formatted(std::mem::take(buffer), format));
        }
    }

    fn toggle(format: &mut TextFormat, flag: TextFormat) {
        if format.contains(flag) {
            format.remove(flag);
        } else {
            format.insert(flag);
        }
    }

    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '\\' => match rest.chars().next() {
                None | Some('\n') => {
                    rest = rest.strip_prefix('\n').unwrap_or(rest);
                    flush(&mut out, &mut buffer, format);
                    out.push(Shape::line_break());
                }
                Some(escaped) => {
                    rest = &rest[escaped.len_utf8()..];
                    buffer.push(escaped);
                }
            },
            '\n' => buffer.push(' '),
            '*' => {
                flush(&mut out, &mut buffer, format);
                if let Some(tail) = rest.strip_prefix('*') {
                    rest = tail;
                    toggle(&mut format, TextFormat::BOLD);
                } else {
                    toggle(&mut format, TextFormat::ITALIC);
                }
            }
            '~' if rest.starts_with('~') => {
                rest = &rest[1..];
                flush(&mut out, &mut buffer, format);
                toggle(&mut format, TextFormat::STRIKETHROUGH);
            }
            '`' => {
                flush(&mut out, &mut buffer, format);
                toggle(&mut format, TextFormat::CODE);
            }
            '<' => match ["br>", "br/>", "br />"]
                .iter()
                .find_map(|tag| rest.strip_prefix(tag))
            {
                Some(tail) => {
                    rest = tail;
                    flush(&mut out, &mut buffer, format);
                    out.push(Shape::line_break());
                }
                None => buffer.push('<'),
            },
            _ => buffer.push(c),
        }
    }
    flush(&mut out, &mut buffer, format);
    normalize_inline(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip(blocks: Vec<Shape>) {
        let output = serialize(&blocks);
        let parsed = parse(&output);
        assert_eq!(parsed, blocks, "markdown was:\n{output}");
        assert_eq!(serialize(&parsed), output);
    }

    #[test]
    fn test_serialize_basic_blocks() {
        let blocks = vec![
            Shape::heading(2, vec![Shape::text("Title")]),
            Shape::paragraph(vec![
                Shape::text("plain "),
                Shape::formatted("bold", TextFormat::BOLD),
            ]),
            Shape::horizontal_rule(),
        ];
        assert_eq!(serialize(&blocks), "## Title\n\nplain **bold**\n\n---");
    }

    #[test]
    fn test_table_serialization() {
        let output = serialize(&[Shape::table(&[&["a", "b"], &["1", ""]])]);
        assert_eq!(output, "| a | b |\n| --- | --- |\n| 1 |  |");
        assert_round_trip(vec![Shape::table(&[&["a", "b"], &["1", ""]])]);
    }

    #[test]
    fn test_block_syntax_in_text_is_escaped() {
        assert_round_trip(vec![
            Shape::paragraph(vec![Shape::text("# not a heading")]),
            Shape::paragraph(vec![Shape::text("- not a list")]),
            Shape::paragraph(vec![Shape::text("12. not ordered")]),
            Shape::paragraph(vec![Shape::text("> | ``` --- *x*")]),
            Shape::paragraph(vec![Shape::text("  leading space")]),
            Shape::paragraph(vec![Shape::text("back\\slash <br> ~~")]),
        ]);
    }

    #[test]
    fn test_overlapping_formats_round_trip() {
        assert_round_trip(vec![Shape::paragraph(vec![
            Shape::formatted("a", TextFormat::BOLD),
            Shape::formatted("b", TextFormat::BOLD | TextFormat::ITALIC),
            Shape::formatted("c", TextFormat::ITALIC),
            Shape::formatted("d", TextFormat::CODE | TextFormat::STRIKETHROUGH),
            Shape::text("*"),
        ])]);
    }

    #[test]
    fn test_line_breaks_in_every_context() {
        let inline = vec![
            Shape::text("one"),
            Shape::line_break(),
            Shape::text("two"),
            Shape::line_break(),
        ];
        assert_round_trip(vec![
            Shape::paragraph(inline.clone()),
            Shape::quote(inline.clone()),
            Shape::heading(1, inline.clone()),
            Shape::list(
                true,
                vec![Shape::list_item(inline.clone()), Shape::list_item(vec![])],
            ),
            Shape::with_children(
                NodeKind::Table,
                vec![Shape::with_children(
                    NodeKind::TableRow,
                    vec![Shape::with_children(
                        NodeKind::TableCell { header: true },
                        inline,
                    )],
                )],
            ),
        ]);
    }

    #[test]
    fn test_code_fence_grows_past_content() {
        let blocks = vec![Shape::code(Some("rust"), "```\nlet x = 1;\n````\n")];
        let output = serialize(&blocks);
        assert!(output.starts_with("`````rust\n"));
        assert_round_trip(blocks);
    }

    #[test]
    fn test_code_info_string_never_breaks_the_fence() {
        let raw = Shape::with_children(
            NodeKind::Code {
                language: Some(" a`b ".to_string()),
            },
            vec![Shape::text("x")],
        );
        let output = serialize(&[raw]);
        assert_eq!(output, "```ab\nx\n```");
        assert_eq!(parse(&output), vec![Shape::code(Some("ab"), "x")]);
        assert_round_trip(vec![Shape::code(Some("a b"), "x")]);
    }

    #[test]
    fn test_empty_paragraph_is_dropped() {
        let output = serialize(&[
            Shape::paragraph(vec![]),
            Shape::paragraph(vec![Shape::text("x")]),
        ]);
        assert_eq!(output, "x");
    }

    #[test]
    fn test_ordered_list_keeps_start() {
        let list = Shape::with_children(
            NodeKind::List {
                ordered: true,
                start: 9,
            },
            vec![
                Shape::list_item(vec![Shape::text("nine")]),
                Shape::list_item(vec![Shape::text("ten")]),
            ],
        );
        let output = serialize(std::slice::from_ref(&list));
        assert_eq!(output, "9. nine\n10. ten");
        assert_round_trip(vec![list]);
    }

    #[test]
    fn test_handwritten_input_is_lenient() {
        let blocks = parse("Line one\nLine two\n\n* * *\n\n```\ncode\n```\n\n| a |\n| b |");
        assert_eq!(
            blocks[0],
            Shape::paragraph(vec![Shape::text("Line one Line two")])
        );
        assert_eq!(blocks[1].kind, NodeKind::Paragraph);
        assert_eq!(blocks[2], Shape::code(None, "code"));
        assert_eq!(blocks[3].children.len(), 2);
    }
}
