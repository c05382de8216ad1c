//! Block-oriented text report.
//!
//! Every analyzer hands its summary over as titled blocks. Empty blocks are
//! hidden and long blocks are cut unless the user asked otherwise; what was
//! hidden or cut is remembered so [`Renderer::finalize`] can tell the user.

use std::io::{self, Write};

use colored::Colorize;

/// Default number of content lines shown per block.
pub const MAX_CONTENT_LINES: usize = 50;

/// A titled piece of report output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub title: String,
    pub content: String,
}

impl Block {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Block {
            title: title.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub full_output: bool,
    pub print_empty_blocks: bool,
    pub max_lines: usize,
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            full_output: false,
            print_empty_blocks: false,
            max_lines: MAX_CONTENT_LINES,
            color: true,
        }
    }
}

/// What the run produced besides the blocks, for the closing notices.
#[derive(Debug, Clone, Copy, Default)]
pub struct Notices {
    pub files_found: usize,
    pub files_extracted: usize,
    pub graph_requested: bool,
    pub graph_edges: usize,
}

pub struct Renderer<W: Write> {
    out: W,
    options: RenderOptions,
    did_snip: bool,
    did_hide: bool,
}

impl Renderer<io::Stdout> {
    pub fn stdout(options: RenderOptions) -> Self {
        Renderer::new(io::stdout(), options)
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, options: RenderOptions) -> Self {
        Renderer {
            out,
            options,
            did_snip: false,
            did_hide: false,
        }
    }

    pub fn render(&mut self, block: &Block) -> io::Result<()> {
        self.render_block(&block.title, &block.content)
    }

    /// Prints one block. The title is omitted when there is no content.
    pub fn render_block(&mut self, title: &str, content: &str) -> io::Result<()> {
        if content.is_empty() && !self.options.print_empty_blocks {
            self.did_hide = true;
            return Ok(());
        }

        writeln!(self.out)?;

        if !content.is_empty() {
            if self.options.color {
                writeln!(self.out, "{}", title.red().bold())?;
            } else {
                writeln!(self.out, "{}", title)?;
            }
        }

        let content = if self.options.full_output {
            content.to_string()
        } else {
            match cut_content(content, self.options.max_lines) {
                Some(cut) => {
                    self.did_snip = true;
                    format!("{}\n{}\n", cut, self.snip_mark())
                }
                None => content.to_string(),
            }
        };

        write!(self.out, "{}", content)?;
        if !content.ends_with('\n') {
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Closing notices about everything the user did not get to see.
    pub fn finalize(&mut self, notices: &Notices) -> io::Result<()> {
        let mut lines = Vec::new();

        if self.did_snip {
            lines.push("Output is snipped at one or more positions. Add --full-output to avoid snipping.");
        }
        if self.did_hide {
            lines.push("Some analyzer output was hidden. Add --print-empty-blocks to show it.");
        }
        if notices.files_extracted == 0 && notices.files_found > 0 {
            lines.push("Files found in stream. Add --extract-all or --extract-these <list> to extract them.");
        }
        if !notices.graph_requested && notices.graph_edges > 0 {
            lines.push("To summarize the communication flow with a Graphviz graph, specify --create-graph <out.dot>.");
        }

        for line in lines {
            if self.options.color {
                writeln!(self.out, "{}", line.bold())?;
            } else {
                writeln!(self.out, "{}", line)?;
            }
        }
        self.out.flush()
    }

    pub fn did_snip(&self) -> bool {
        self.did_snip
    }

    pub fn did_hide(&self) -> bool {
        self.did_hide
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn snip_mark(&self) -> String {
        let mark = format!("----- cut at {} entries -----", self.options.max_lines);
        if self.options.color {
            mark.bold().to_string()
        } else {
            mark
        }
    }
}

/// Returns the first `max_lines` lines (without the final newline) when
/// anything follows them, `None` when the content fits.
fn cut_content(content: &str, max_lines: usize) -> Option<&str> {
    let (pos, _) = content.match_indices('\n').nth(max_lines.checked_sub(1)?)?;
    if pos + 1 < content.len() {
        Some(&content[..pos])
    } else {
        None
    }
}
