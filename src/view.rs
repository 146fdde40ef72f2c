//! Raw-mode terminal status view.
//!
//! No framebuffer: the front end only shows a handful of text rows, redrawn
//! when they change.

use std::io::Write;

use anyhow::Result;
use crossterm::{cursor, terminal, QueueableCommand};

pub struct StatusView<W: Write> {
    out: W,
    last: Vec<String>,
}

impl StatusView<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StatusView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last: Vec::new(),
        }
    }

    pub fn enter(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        self.out.queue(terminal::EnterAlternateScreen)?;
        self.out.queue(cursor::Hide)?;
        self.out.queue(terminal::DisableLineWrap)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn exit(&mut self) -> Result<()> {
        self.out.queue(terminal::EnableLineWrap)?;
        self.out.queue(cursor::Show)?;
        self.out.queue(terminal::LeaveAlternateScreen)?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Draw `rows` from the top-left corner. Returns false when nothing changed.
    pub fn draw(&mut self, rows: &[String]) -> Result<bool> {
        if self.last.as_slice() == rows {
            return Ok(false);
        }

        for (y, row) in rows.iter().enumerate() {
            self.out.queue(cursor::MoveTo(0, y as u16))?;
            self.out.queue(terminal::Clear(terminal::ClearType::CurrentLine))?;
            self.out.write_all(row.as_bytes())?;
        }
        for y in rows.len()..self.last.len() {
            self.out.queue(cursor::MoveTo(0, y as u16))?;
            self.out.queue(terminal::Clear(terminal::ClearType::CurrentLine))?;
        }
        self.out.flush()?;

        self.last.clear();
        self.last.extend_from_slice(rows);
        Ok(true)
    }

    /// Force the next draw to repaint every row.
    pub fn invalidate(&mut self) {
        self.last.clear();
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
