use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

/// Converts accumulated message Markdown into styled terminal text.
///
/// Soft breaks become real line breaks so streamed prose keeps its shape,
/// and raw HTML events are dropped on the floor instead of being injected
/// into the terminal.
pub fn render_markdown(text: &str) -> Text<'static> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut builder = TextBuilder::new();
    for event in Parser::new_ext(text, options) {
        builder.handle(event);
    }
    builder.finish()
}

struct TextBuilder {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    list_stack: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
}

impl TextBuilder {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            current: Vec::new(),
            styles: Vec::new(),
            list_stack: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag_end) => self.end_tag(tag_end),
            Event::Text(text) => {
                if self.in_code_block {
                    self.push_code_lines(&text);
                } else {
                    self.push_span(&text);
                }
            }
            Event::Code(code) => {
                let style = self.style().patch(Style::default().fg(Color::Cyan));
                self.current.push(Span::styled(code.into_string(), style));
            }
            Event::SoftBreak | Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.break_block();
                self.current.push(Span::styled(
                    "────────".to_string(),
                    Style::default().fg(Color::DarkGray),
                ));
                self.flush_line();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.current.push(Span::raw(marker.to_string()));
            }
            // Sanitization boundary: raw HTML never reaches the terminal.
            Event::Html(_) | Event::InlineHtml(_) => {}
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.break_block(),
            Tag::Heading { .. } => {
                self.break_block();
                self.push_style(
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD),
                );
            }
            Tag::BlockQuote(_) => {
                self.break_block();
                self.quote_depth += 1;
                self.push_style(Style::default().fg(Color::DarkGray));
            }
            Tag::CodeBlock(_) => {
                self.break_block();
                self.in_code_block = true;
            }
            Tag::List(start) => {
                if self.list_stack.is_empty() {
                    self.break_block();
                }
                self.list_stack.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let marker = match self.list_stack.last_mut() {
                    Some(Some(index)) => {
                        let marker = format!("{}. ", index);
                        *index += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                let indent = "  ".repeat(self.list_stack.len().saturating_sub(1));
                self.current.push(Span::raw(format!("{}{}", indent, marker)));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { .. } => self.push_style(
                Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED),
            ),
            Tag::Table(_) => self.break_block(),
            _ => {}
        }
    }

    fn end_tag(&mut self, tag_end: TagEnd) {
        match tag_end {
            TagEnd::Paragraph => self.flush_line(),
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush_line();
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.pop_style();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                self.flush_line();
                self.in_code_block = false;
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.list_stack.pop();
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.pop_style()
            }
            TagEnd::TableCell => self.current.push(Span::raw(" │ ".to_string())),
            TagEnd::TableRow | TagEnd::TableHead => self.flush_line(),
            TagEnd::Table => self.flush_line(),
            _ => {}
        }
    }

    fn style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, style| acc.patch(*style))
    }

    fn push_style(&mut self, style: Style) {
        self.styles.push(style);
    }

    fn pop_style(&mut self) {
        self.styles.pop();
    }

    fn push_span(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let style = self.style();
        self.current.push(Span::styled(text.to_string(), style));
    }

    fn push_code_lines(&mut self, text: &str) {
        let style = Style::default().fg(Color::Green);
        for line in text.split('\n') {
            if line.is_empty() && self.current.is_empty() {
                continue;
            }
            self.current.push(Span::styled(line.to_string(), style));
            self.flush_line();
        }
    }

    /// Ends the current visual line, applying the quote prefix if needed.
    fn flush_line(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.current.len() + 1);
        if self.quote_depth > 0 && !self.in_code_block {
            spans.push(Span::styled(
                "▌ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    /// Separates block-level elements with one blank line.
    fn break_block(&mut self) {
        self.flush_line();
        if !self.lines.is_empty() {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Text<'static> {
        self.flush_line();
        Text::from(self.lines)
    }
}
