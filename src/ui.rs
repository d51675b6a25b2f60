use std::io;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::RelayClient;
use crate::markdown::render_markdown;
use crate::protocol::{ChatMessage, Role, StreamChunk};
use crate::render::render_chunk;

type UiResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const INPUT_HEIGHT: u16 = 6;

/// Only this many trailing transcript entries travel with each request.
const HISTORY_WINDOW: usize = 7;

// Restores terminal settings even if the loop exits early.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Self {
        Self
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = io::stdout().flush();
    }
}

/// One transcript entry. The id exists so a streaming append can find and
/// replace exactly the message it belongs to, however fast chunks arrive.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug)]
enum UiEvent {
    Chunk { message_id: Uuid, chunk: StreamChunk },
    StreamDone,
    StreamError(String),
}

struct InputBuffer {
    lines: Vec<String>,
    cursor_x: usize,
    cursor_y: usize,
}

impl InputBuffer {
    fn new() -> Self {
        Self {
            lines: vec![String::new()],
            cursor_x: 0,
            cursor_y: 0,
        }
    }

    fn clear(&mut self) {
        self.lines = vec![String::new()];
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    fn insert_char(&mut self, c: char) {
        let line = &mut self.lines[self.cursor_y];
        if self.cursor_x >= line.len() {
            line.push(c);
        } else {
            line.insert(self.cursor_x, c);
        }
        self.cursor_x += 1;
    }

    fn delete_char(&mut self) {
        let line = &mut self.lines[self.cursor_y];
        if self.cursor_x > 0 {
            line.remove(self.cursor_x - 1);
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            let prev_line = self.lines.remove(self.cursor_y);
            self.cursor_y -= 1;
            self.cursor_x = self.lines[self.cursor_y].len();
            self.lines[self.cursor_y].push_str(&prev_line);
        }
    }

    fn new_line(&mut self) {
        let line = &self.lines[self.cursor_y];
        let remaining: String = line.chars().skip(self.cursor_x).collect();
        self.lines[self.cursor_y] = line.chars().take(self.cursor_x).collect();
        self.lines.insert(self.cursor_y + 1, remaining);
        self.cursor_y += 1;
        self.cursor_x = 0;
    }

    fn move_left(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.lines[self.cursor_y].len();
        }
    }

    fn move_right(&mut self) {
        let line_len = self.lines[self.cursor_y].len();
        if self.cursor_x < line_len {
            self.cursor_x += 1;
        } else if self.cursor_y < self.lines.len() - 1 {
            self.cursor_y += 1;
            self.cursor_x = 0;
        }
    }

    fn move_up(&mut self) {
        if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.cursor_x.min(self.lines[self.cursor_y].len());
        }
    }

    fn move_down(&mut self) {
        if self.cursor_y < self.lines.len() - 1 {
            self.cursor_y += 1;
            self.cursor_x = self.cursor_x.min(self.lines[self.cursor_y].len());
        }
    }

    fn to_string(&self) -> String {
        self.lines.join("\n")
    }

    fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    fn render(&self) -> Text<'static> {
        if self.is_empty() {
            return Text::from(Span::styled(
                "Send a message...",
                Style::default().fg(Color::DarkGray),
            ));
        }
        Text::from(
            self.lines
                .iter()
                .map(|l| Line::from(l.clone()))
                .collect::<Vec<_>>(),
        )
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the trailing conversation window in wire form, captured before
/// the new exchange is pushed onto the transcript.
fn history_window(messages: &[Message]) -> Vec<ChatMessage> {
    let skip = messages.len().saturating_sub(HISTORY_WINDOW);
    messages
        .iter()
        .skip(skip)
        .map(|message| ChatMessage::new(message.role, message.content.clone()))
        .collect()
}

pub struct App {
    messages: Vec<Message>,
    input: InputBuffer,
    should_quit: bool,
    sender: mpsc::Sender<UiEvent>,
    receiver: mpsc::Receiver<UiEvent>,
    is_loading: bool,
    client: Arc<RelayClient>,
}

impl App {
    pub fn new(client: RelayClient) -> Self {
        let (sender, receiver) = mpsc::channel(100);

        Self {
            messages: vec![Message::new(Role::Assistant, "Hello!")],
            input: InputBuffer::new(),
            should_quit: false,
            sender,
            receiver,
            is_loading: false,
            client: Arc::new(client),
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let [transcript_area, input_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(INPUT_HEIGHT)])
                .areas(f.area());

        let text = self.transcript_text();
        let inner_width = transcript_area.width.saturating_sub(2).max(1);
        let total_height = rendered_height(&text, inner_width);
        let visible = transcript_area.height.saturating_sub(2);
        let scroll = total_height.saturating_sub(visible);

        let transcript = Paragraph::new(text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Brook ")
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0));
        f.render_widget(transcript, transcript_area);

        let title = if self.is_loading {
            " Input (Esc to quit) [Streaming...] "
        } else {
            " Input (Enter to send, Esc to quit) "
        };
        let input_paragraph = Paragraph::new(self.input.render())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(input_paragraph, input_area);

        let cursor_x = (self.input.cursor_x + 1) as u16;
        let cursor_y = self.input.cursor_y as u16;
        let x = (input_area.x + cursor_x).min(input_area.x + input_area.width - 2);
        let y = (input_area.y + 1 + cursor_y).min(input_area.y + input_area.height - 2);
        f.set_cursor_position((x, y));
    }

    fn transcript_text(&self) -> Text<'static> {
        let mut lines: Vec<Line<'static>> = Vec::new();

        for message in &self.messages {
            let (label, color) = match message.role {
                Role::User => ("You:", Color::Blue),
                Role::Assistant => ("Assistant:", Color::Yellow),
            };
            lines.push(Line::from(Span::styled(
                label.to_string(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));

            let streaming_placeholder = self.is_loading
                && message.role == Role::Assistant
                && message.content.is_empty();
            if streaming_placeholder {
                lines.push(Line::from(Span::styled(
                    "Streaming...",
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
            } else {
                lines.extend(render_markdown(&message.content).lines);
            }

            lines.push(Line::default());
        }

        Text::from(lines)
    }

    fn append_to_message(&mut self, id: Uuid, fragment: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.content.push_str(fragment);
        }
    }

    fn push_error(&mut self, message: String) {
        let message = if message.is_empty() {
            "Failed to get response".to_string()
        } else {
            message
        };
        self.messages
            .push(Message::new(Role::Assistant, format!("Error: {}", message)));
    }

    fn submit_input(&mut self) {
        let content = self.input.to_string();
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        // The window is built from the transcript as it stood before this
        // exchange, matching what the user was actually replying to.
        let mut payload = history_window(&self.messages);
        payload.push(ChatMessage::new(Role::User, content));

        self.messages.push(Message::new(Role::User, content));
        let placeholder = Message::new(Role::Assistant, "");
        let assistant_id = placeholder.id;
        self.messages.push(placeholder);

        self.input.clear();
        self.is_loading = true;

        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = client
                .stream_chat(payload, |chunk| {
                    let sender = sender.clone();
                    async move {
                        let _ = sender
                            .send(UiEvent::Chunk {
                                message_id: assistant_id,
                                chunk,
                            })
                            .await;
                    }
                })
                .await;

            match result {
                Ok(()) => {
                    let _ = sender.send(UiEvent::StreamDone).await;
                }
                Err(err) => {
                    let _ = sender.send(UiEvent::StreamError(err.to_string())).await;
                }
            }
        });
    }

    fn handle_events(&mut self) -> UiResult<bool> {
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                UiEvent::Chunk { message_id, chunk } => {
                    let fragment = render_chunk(&chunk);
                    self.append_to_message(message_id, &fragment);
                }
                UiEvent::StreamDone => {
                    self.is_loading = false;
                }
                UiEvent::StreamError(message) => {
                    self.push_error(message);
                    self.is_loading = false;
                }
            }
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    self.should_quit = true;
                    return Ok(false);
                }

                if key.code == KeyCode::Esc {
                    self.should_quit = true;
                    return Ok(false);
                }

                // The input is inert while a response is streaming.
                if self.is_loading {
                    return Ok(true);
                }

                match key.code {
                    KeyCode::Enter => {
                        if key.modifiers.contains(KeyModifiers::SHIFT) {
                            self.input.new_line();
                        } else {
                            self.submit_input();
                        }
                    }
                    KeyCode::Char(c) => {
                        self.input.insert_char(c);
                    }
                    KeyCode::Backspace => {
                        self.input.delete_char();
                    }
                    KeyCode::Left => {
                        self.input.move_left();
                    }
                    KeyCode::Right => {
                        self.input.move_right();
                    }
                    KeyCode::Up => {
                        self.input.move_up();
                    }
                    KeyCode::Down => {
                        self.input.move_down();
                    }
                    KeyCode::Home => {
                        self.input.cursor_x = 0;
                    }
                    KeyCode::End => {
                        self.input.cursor_x = self.input.lines[self.input.cursor_y].len();
                    }
                    _ => {}
                }
            }
        }

        Ok(true)
    }
}

fn rendered_height(text: &Text<'_>, width: u16) -> u16 {
    let width = width.max(1) as usize;
    let mut total = 0usize;
    for line in &text.lines {
        let len: usize = line.spans.iter().map(|span| span.content.chars().count()).sum();
        total += (len.max(1) + width - 1) / width;
    }
    total as u16
}

pub fn run_tui(client: RelayClient) -> UiResult<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let _guard = TerminalGuard::new();
    let mut app = App::new(client);

    while !app.should_quit {
        terminal.draw(|f| app.draw(f))?;

        if !app.handle_events()? {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Usage;

    fn test_app() -> App {
        App::new(RelayClient::new("http://localhost:3000"))
    }

    #[test]
    fn input_buffer_shift_enter_inserts_new_line() {
        let mut buffer = InputBuffer::new();
        for ch in "hello".chars() {
            buffer.insert_char(ch);
        }
        buffer.new_line();
        for ch in "world".chars() {
            buffer.insert_char(ch);
        }

        assert_eq!(buffer.to_string(), "hello\nworld");
        assert_eq!(buffer.lines.len(), 2);
        assert_eq!(buffer.cursor_y, 1);
    }

    #[test]
    fn history_window_keeps_the_last_seven_entries() {
        let messages: Vec<Message> = (0..10)
            .map(|i| Message::new(Role::User, format!("msg {}", i)))
            .collect();

        let window = history_window(&messages);
        assert_eq!(window.len(), 7);
        assert_eq!(window[0].content, "msg 3");
        assert_eq!(window[6].content, "msg 9");

        let short: Vec<Message> = (0..3)
            .map(|i| Message::new(Role::Assistant, format!("msg {}", i)))
            .collect();
        assert_eq!(history_window(&short).len(), 3);
    }

    #[test]
    fn chunks_append_to_exactly_their_message() {
        let mut app = test_app();
        let streaming = Message::new(Role::Assistant, "");
        let id = streaming.id;
        app.messages.push(streaming);
        app.messages.push(Message::new(Role::Assistant, "bystander"));

        app.append_to_message(id, &render_chunk(&StreamChunk::Content("The ".to_string())));
        app.append_to_message(id, &render_chunk(&StreamChunk::Content("answer".to_string())));

        let target = app.messages.iter().find(|m| m.id == id).expect("message kept");
        assert_eq!(target.content, "The answer");
        assert!(app.messages.iter().any(|m| m.content == "bystander"));
    }

    #[test]
    fn interleaved_chunks_assemble_in_arrival_order() {
        let mut app = test_app();
        let streaming = Message::new(Role::Assistant, "");
        let id = streaming.id;
        app.messages.push(streaming);

        let chunks = [
            StreamChunk::Model(Some("brook-large".to_string())),
            StreamChunk::Content("one ".to_string()),
            StreamChunk::Content("two ".to_string()),
            StreamChunk::Content("three".to_string()),
            StreamChunk::Usage(Usage::default()),
        ];
        for chunk in &chunks {
            app.append_to_message(id, &render_chunk(chunk));
        }

        let expected: String = chunks.iter().map(render_chunk).collect();
        let target = app.messages.iter().find(|m| m.id == id).expect("message kept");
        assert_eq!(target.content, expected);
    }

    #[test]
    fn stream_errors_become_a_synthetic_assistant_message() {
        let mut app = test_app();
        app.push_error("connection refused".to_string());
        let last = app.messages.last().expect("message pushed");
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Error: connection refused");

        app.push_error(String::new());
        let last = app.messages.last().expect("message pushed");
        assert_eq!(last.content, "Error: Failed to get response");
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut app = test_app();
        let before: Vec<String> = app.messages.iter().map(|m| m.content.clone()).collect();
        app.append_to_message(Uuid::new_v4(), "stray");
        let after: Vec<String> = app.messages.iter().map(|m| m.content.clone()).collect();
        assert_eq!(before, after);
    }
}
