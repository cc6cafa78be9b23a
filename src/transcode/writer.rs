use crate::transcode::compose::MetricLine;
use std::io::{self, BufWriter, Write};

/// Marker line terminating a complete exposition
pub const EOF_MARKER: &str = "# EOF";

/// Writes metric lines to a single output, optionally echoing them
pub struct MetricWriter<W: Write> {
    writer: BufWriter<W>,
    echo: Option<Box<dyn Write>>,
    lines_written: usize,
}

impl<W: Write> MetricWriter<W> {
    pub fn new(writer: W) -> Self {
        MetricWriter {
            writer: BufWriter::new(writer),
            echo: None,
            lines_written: 0,
        }
    }

    /// Also copy every line to `echo` (the debug diagnostic sink)
    pub fn with_echo(mut self, echo: Box<dyn Write>) -> Self {
        self.echo = Some(echo);
        self
    }

    pub fn write_lines(&mut self, lines: &[MetricLine]) -> io::Result<()> {
        for line in lines {
            writeln!(self.writer, "{}", line)?;
            self.echo_line(line);
            self.lines_written += 1;
        }
        Ok(())
    }

    // A failing echo sink is turned off rather than failing the output
    fn echo_line(&mut self, line: &MetricLine) {
        if let Some(echo) = self.echo.as_mut() {
            if let Err(err) = writeln!(echo, "{}", line) {
                log::warn!("disabling metric echo after write failure: {err}");
                self.echo = None;
            }
        }
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        if let Some(echo) = self.echo.as_mut() {
            if let Err(err) = echo.flush() {
                log::warn!("couldn't flush metric echo: {err}");
                self.echo = None;
            }
        }
        Ok(())
    }

    /// Write the `# EOF` marker, flush, and hand back the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        writeln!(self.writer, "{}", EOF_MARKER)?;
        self.flush()?;
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}
