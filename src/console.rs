//! Line-oriented terminal front-end
//!
//! Reads commands from stdin and draws session events as they arrive:
//! streamed text with a trailing cursor, the finalized message, and a
//! horizontal bar chart when the answer carried a numeric table.

use crate::chart::ChartSpec;
use crate::runtime::{SessionEvent, SessionHandle};
use crate::session::{Message, TurnPhase};
use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::style::{style, Print, PrintStyledContent, Stylize};
use crossterm::terminal::{self, Clear, ClearType};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// Shown after the released text while a turn is streaming
pub const CURSOR: &str = "▌";
const BAR_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Say(String),
    Stop,
    Reset,
    Quit,
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => ConsoleCommand::Empty,
            "/stop" => ConsoleCommand::Stop,
            "/reset" => ConsoleCommand::Reset,
            "/quit" => ConsoleCommand::Quit,
            text => ConsoleCommand::Say(text.to_string()),
        }
    }
}

/// Run the console until `/quit`, end of input, or the session stops
pub async fn run(handle: SessionHandle) -> io::Result<()> {
    let mut events = handle.subscribe();
    let width = terminal::size().ok().map(|(columns, _)| columns);
    let mut renderer = Renderer::new(io::stdout()).with_width(width);

    let transcript = handle.messages().await.map_err(io::Error::other)?;
    for message in &transcript {
        renderer.message(message)?;
    }
    renderer.prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match ConsoleCommand::parse(&line) {
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Empty => renderer.prompt()?,
                    ConsoleCommand::Stop => match handle.request_cancel().await {
                        Ok(true) => {}
                        Ok(false) => renderer.notice("Already stopping")?,
                        Err(e) => renderer.notice(&e.to_string())?,
                    },
                    ConsoleCommand::Reset => {
                        handle.reset_conversation().await.map_err(io::Error::other)?;
                    }
                    ConsoleCommand::Say(text) => {
                        if let Err(e) = handle.submit_user_input(text).await {
                            renderer.notice(&e.to_string())?;
                        }
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) => renderer.render(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Console fell behind session events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

/// Draws session events onto a terminal-like writer
///
/// Streamed text is assumed to start at column 0, so its on-screen extent
/// follows from its length and the terminal width.
pub struct Renderer<W: Write> {
    out: W,
    /// Text of the current turn already on screen
    streamed: String,
    cursor_shown: bool,
    /// Terminal columns; `None` when the writer is not a sized terminal
    width: Option<u16>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            streamed: String::new(),
            cursor_shown: false,
            width: None,
        }
    }

    pub fn with_width(mut self, width: Option<u16>) -> Self {
        self.width = width.filter(|w| *w > 0);
        self
    }

    pub fn render(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::StateChange {
                phase: TurnPhase::Idle,
            } => self.prompt(),
            SessionEvent::StateChange { .. } => Ok(()),
            SessionEvent::Fragment { text } => self.fragment(text),
            SessionEvent::Finalized {
                message,
                chart,
                cancelled,
            } => {
                self.finalized(message, *cancelled)?;
                if let Some(chart) = chart {
                    self.chart(chart)?;
                }
                Ok(())
            }
            SessionEvent::Warning { message } => self.notice(message),
            SessionEvent::Reset { greeting } => {
                self.erase_cursor()?;
                self.streamed.clear();
                queue!(self.out, Print("\n"))?;
                self.message(greeting)
            }
        }
    }

    fn message(&mut self, message: &Message) -> io::Result<()> {
        queue!(
            self.out,
            PrintStyledContent(style(format!("{}: ", message.role)).dim()),
            Print(&message.content),
            Print("\n")
        )?;
        self.out.flush()
    }

    fn prompt(&mut self) -> io::Result<()> {
        queue!(self.out, PrintStyledContent(style("> ").bold()))?;
        self.out.flush()
    }

    fn notice(&mut self, text: &str) -> io::Result<()> {
        self.erase_cursor()?;
        // The stream resumes below the notice, from column 0
        self.streamed.clear();
        queue!(self.out, PrintStyledContent(style(format!("\n[{text}]\n")).yellow()))?;
        self.out.flush()
    }

    fn fragment(&mut self, text: &str) -> io::Result<()> {
        let delta = text
            .strip_prefix(self.streamed.as_str())
            .unwrap_or(text)
            .to_string();
        self.erase_cursor()?;
        queue!(self.out, Print(delta), Print(CURSOR))?;
        self.cursor_shown = true;
        self.streamed = text.to_string();
        self.out.flush()
    }

    fn finalized(&mut self, message: &Message, cancelled: bool) -> io::Result<()> {
        self.erase_cursor()?;

        // A stopped turn keeps what is on screen and adds the annotation.
        // A completed answer is redrawn verbatim over the normalized stream.
        let appended = if cancelled {
            message
                .content
                .strip_prefix(self.streamed.as_str())
                .map(str::to_string)
        } else {
            None
        };
        match appended {
            Some(rest) => queue!(self.out, Print(rest))?,
            None => {
                self.erase_streamed()?;
                queue!(self.out, Print(&message.content))?;
            }
        }
        self.streamed.clear();
        queue!(self.out, Print("\n"))?;
        self.out.flush()
    }

    fn chart(&mut self, chart: &ChartSpec) -> io::Result<()> {
        queue!(self.out, Print("\n"))?;
        for line in chart_lines(chart, BAR_WIDTH) {
            queue!(self.out, PrintStyledContent(style(line).cyan()), Print("\n"))?;
        }
        self.out.flush()
    }

    /// Row and column just past the streamed text, relative to where it began
    fn stream_end(&self) -> (usize, usize) {
        let len = self.streamed.chars().count();
        match self.width {
            Some(width) => (len / usize::from(width), len % usize::from(width)),
            None => (0, len),
        }
    }

    fn erase_cursor(&mut self) -> io::Result<()> {
        if self.cursor_shown {
            let (_, column) = self.stream_end();
            queue!(
                self.out,
                MoveToColumn(to_u16(column)),
                Clear(ClearType::UntilNewLine)
            )?;
            self.cursor_shown = false;
        }
        Ok(())
    }

    /// Clear every row the streamed text occupies and return to its start
    fn erase_streamed(&mut self) -> io::Result<()> {
        let (rows, _) = self.stream_end();
        queue!(self.out, MoveToColumn(0))?;
        if rows > 0 {
            queue!(self.out, MoveUp(to_u16(rows)))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        Ok(())
    }
}

fn to_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Horizontal bar chart, one line per point, bars scaled to `width` columns
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn chart_lines(chart: &ChartSpec, width: usize) -> Vec<String> {
    let label_width = chart
        .points
        .iter()
        .map(|p| p.category.chars().count())
        .max()
        .unwrap_or(0);
    let max = chart
        .points
        .iter()
        .map(|p| p.value.abs())
        .fold(0.0_f64, f64::max);

    let mut lines = vec![format!("{} by {}", chart.value_field, chart.category_field)];
    for point in &chart.points {
        let len = if max > 0.0 {
            (point.value.abs() / max * width as f64).round() as usize
        } else {
            0
        };
        lines.push(format!(
            "{:<label_width$} │{} {}",
            point.category,
            "█".repeat(len),
            format_value(point.value)
        ));
    }
    lines
}

fn format_value(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
