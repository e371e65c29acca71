//! Terminal cell screens and the renderer boundary.
//!
//! A screen is shipped as `cols:u16 le, rows:u16 le` followed by
//! `cols * rows` packed 12-byte cells. Glyph rasterization belongs to a
//! [`Renderer`]; this module only decodes cells and owns the pixel buffer the
//! renderer draws into.

use crate::producer::{AvInfo, Content, FrameIo, Producer, StepStatus, SystemInfo};
use crate::video::{PixelFormat, VideoFrame};

pub const CELL_SIZE: usize = 12;
const SCREEN_HEADER: usize = 4;

/// Cell attribute bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellAttr(pub u8);

impl CellAttr {
    pub const BOLD: u8 = 1 << 0;
    pub const ITALIC: u8 = 1 << 1;
    pub const INVERSE: u8 = 1 << 2;
    pub const UNDERLINE: u8 = 1 << 3;
    pub const STRIKETHROUGH: u8 = 1 << 4;
    pub const CURSOR: u8 = 1 << 5;
    /// The cell is covered by a wide glyph to its left.
    pub const SKIP: u8 = 1 << 6;

    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub fg: [u8; 4],
    pub bg: [u8; 4],
    pub attr: CellAttr,
    pub ucs4: u32,
}

impl Cell {
    /// Decodes `fg rgb, bg rgb, attr, pad, ucs4 le`. Foreground is opaque,
    /// background takes the screen alpha.
    pub fn unpack(raw: &[u8; CELL_SIZE], alpha: u8) -> Self {
        Self {
            fg: [raw[0], raw[1], raw[2], 0xff],
            bg: [raw[3], raw[4], raw[5], alpha],
            attr: CellAttr(raw[6]),
            ucs4: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
        }
    }

    pub fn pack(&self) -> [u8; CELL_SIZE] {
        let cp = self.ucs4.to_le_bytes();
        [
            self.fg[0], self.fg[1], self.fg[2], self.bg[0], self.bg[1], self.bg[2], self.attr.0,
            0, cp[0], cp[1], cp[2], cp[3],
        ]
    }

    pub fn glyph(&self) -> Option<char> {
        char::from_u32(self.ucs4)
    }

    /// No visible glyph: empty, whitespace or not a valid code point.
    pub fn is_blank(&self) -> bool {
        self.glyph().map_or(true, |c| c == '\0' || c.is_whitespace())
    }
}

/// Decoded cell grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellScreen {
    cols: u16,
    rows: u16,
    cells: Vec<Cell>,
}

impl CellScreen {
    /// `None` when the header is missing or the cell data is short.
    pub fn parse(data: &[u8], alpha: u8) -> Option<Self> {
        let header = data.get(..SCREEN_HEADER)?;
        let cols = u16::from_le_bytes([header[0], header[1]]);
        let rows = u16::from_le_bytes([header[2], header[3]]);
        let count = cols as usize * rows as usize;
        let body = data.get(SCREEN_HEADER..SCREEN_HEADER + count * CELL_SIZE)?;
        let cells = body
            .chunks_exact(CELL_SIZE)
            .filter_map(|raw| <&[u8; CELL_SIZE]>::try_from(raw).ok())
            .map(|raw| Cell::unpack(raw, alpha))
            .collect();
        Some(Self { cols, rows, cells })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SCREEN_HEADER + self.cells.len() * CELL_SIZE);
        out.extend_from_slice(&self.cols.to_le_bytes());
        out.extend_from_slice(&self.rows.to_le_bytes());
        for cell in &self.cells {
            out.extend_from_slice(&cell.pack());
        }
        out
    }

    pub fn from_cells(cols: u16, rows: u16, cells: Vec<Cell>) -> Option<Self> {
        (cells.len() == cols as usize * rows as usize).then_some(Self { cols, rows, cells })
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cell(&self, col: u16, row: u16) -> Option<&Cell> {
        if col >= self.cols {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }
}

/// Packed XRGB8888 pixel buffer handed to a renderer. Writes outside the
/// buffer are clipped.
pub struct RasterTarget<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> RasterTarget<'a> {
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32) -> Option<Self> {
        (pixels.len() >= width as usize * height as usize * 4).then_some(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
        let x1 = x.saturating_add(w).min(self.width);
        let y1 = y.saturating_add(h).min(self.height);
        let word = ((u32::from(color[0]) << 16) | (u32::from(color[1]) << 8) | u32::from(color[2]))
            .to_le_bytes();
        for row in y.min(y1)..y1 {
            let start = (row * self.width + x.min(x1)) as usize * 4;
            let end = (row * self.width + x1) as usize * 4;
            for px in self.pixels[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&word);
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y * self.width + x) as usize * 4;
        self.pixels[at..at + 4].try_into().ok()
    }
}

/// Draws one cell at a pixel position.
pub trait Renderer {
    /// Cell width and height in pixels.
    fn cell_size(&self) -> (u32, u32);

    fn draw_cell(&mut self, target: &mut RasterTarget<'_>, x: u32, y: u32, cell: &Cell);
}

/// Background fill plus a solid block for any visible glyph, with the
/// underline and strikethrough bars. Enough to see layout and colors.
#[derive(Clone, Copy, Debug)]
pub struct SolidRenderer {
    cell_w: u32,
    cell_h: u32,
}

impl SolidRenderer {
    pub fn new(cell_w: u32, cell_h: u32) -> Self {
        Self {
            cell_w: cell_w.max(1),
            cell_h: cell_h.max(1),
        }
    }
}

impl Default for SolidRenderer {
    fn default() -> Self {
        Self::new(8, 16)
    }
}

impl Renderer for SolidRenderer {
    fn cell_size(&self) -> (u32, u32) {
        (self.cell_w, self.cell_h)
    }

    fn draw_cell(&mut self, target: &mut RasterTarget<'_>, x: u32, y: u32, cell: &Cell) {
        let (mut fg, mut bg) = (cell.fg, cell.bg);
        if cell.attr.contains(CellAttr::INVERSE) ^ cell.attr.contains(CellAttr::CURSOR) {
            std::mem::swap(&mut fg, &mut bg);
        }
        target.fill_rect(x, y, self.cell_w, self.cell_h, bg);
        if cell.is_blank() {
            return;
        }

        let inset_x = self.cell_w / 4;
        let inset_y = self.cell_h / 4;
        target.fill_rect(
            x + inset_x,
            y + inset_y,
            self.cell_w - 2 * inset_x,
            self.cell_h - 2 * inset_y,
            fg,
        );

        let bar = (self.cell_h / 20) | 1;
        if cell.attr.contains(CellAttr::UNDERLINE) {
            target.fill_rect(x, y + self.cell_h - bar, self.cell_w, bar, fg);
        }
        if cell.attr.contains(CellAttr::STRIKETHROUGH) {
            target.fill_rect(x, y + self.cell_h / 2 - bar / 2, self.cell_w, bar, fg);
        }
    }
}

/// Producer that renders a loaded cell screen through a [`Renderer`].
pub struct RasterProducer<R> {
    renderer: R,
    screen: Option<CellScreen>,
    pixels: Vec<u8>,
    dirty: bool,
}

impl<R: Renderer> RasterProducer<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            screen: None,
            pixels: Vec::new(),
            dirty: false,
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        let (cw, ch) = self.renderer.cell_size();
        match &self.screen {
            Some(screen) => (screen.cols as u32 * cw, screen.rows as u32 * ch),
            None => (0, 0),
        }
    }

    /// Swaps in a new screen; the next step redraws.
    pub fn set_screen(&mut self, screen: CellScreen) {
        self.screen = Some(screen);
        self.dirty = true;
    }

    fn redraw(&mut self) {
        let (width, height) = self.dimensions();
        let (cw, ch) = self.renderer.cell_size();
        self.pixels.resize(width as usize * height as usize * 4, 0);
        let (Some(screen), Some(mut target)) = (
            self.screen.as_ref(),
            RasterTarget::new(&mut self.pixels, width, height),
        ) else {
            return;
        };
        for row in 0..screen.rows {
            for col in 0..screen.cols {
                let Some(cell) = screen.cell(col, row) else {
                    continue;
                };
                if cell.attr.contains(CellAttr::SKIP) {
                    continue;
                }
                self.renderer
                    .draw_cell(&mut target, col as u32 * cw, row as u32 * ch, cell);
            }
        }
        self.dirty = false;
    }
}

impl<R: Renderer> Producer for RasterProducer<R> {
    fn init(&mut self) -> SystemInfo {
        SystemInfo {
            library_name: "raster".into(),
            library_version: env!("CARGO_PKG_VERSION").into(),
            valid_extensions: "cells".into(),
        }
    }

    fn load(&mut self, content: &Content) -> bool {
        let Some(screen) = CellScreen::parse(&content.data, 0xff) else {
            tracing::error!(len = content.data.len(), "cell screen is truncated");
            return false;
        };
        if screen.cols == 0 || screen.rows == 0 {
            return false;
        }
        self.set_screen(screen);
        let (width, height) = self.dimensions();
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            tracing::error!(width, height, "cell screen too large to present");
            self.screen = None;
            return false;
        }
        true
    }

    fn av_info(&self) -> AvInfo {
        let (width, height) = self.dimensions();
        AvInfo {
            max_width: width as u16,
            max_height: height as u16,
            fps: 60.0,
            sample_rate: 48_000.0,
        }
    }

    fn reset(&mut self) {
        self.dirty = true;
    }

    fn step(&mut self, io: &mut FrameIo<'_>) -> StepStatus {
        if self.screen.is_none() {
            return StepStatus::Stop;
        }
        if self.dirty {
            self.redraw();
        }
        let (width, height) = self.dimensions();
        let frame = VideoFrame::new(
            &self.pixels,
            width,
            height,
            width as usize * 4,
            PixelFormat::Xrgb8888,
        );
        io.video_refresh(&frame);
        StepStatus::Continue
    }
}
