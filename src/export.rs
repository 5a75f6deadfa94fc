//! Chat transcript export as PDF.
//!
//! Renders a list of turns into a paginated US Letter document with
//! [`lopdf`]. User turns are blue, left aligned and prefixed `You:`;
//! assistant turns are green, right aligned and prefixed `Efiko:`. Lines
//! are wrapped to the text width using Helvetica glyph metrics, and a new
//! page starts when the current one is full.
//!
//! Output is a pure function of the input: no timestamps, document IDs or
//! compression are written, so identical transcripts render to identical
//! bytes.
//!
//! Text is set in the built-in Helvetica font, which only covers Latin-1.
//! Letters outside it that Nigerian languages use are folded to their base
//! letter (`ẹ` → `e`, `ṣ` → `s`) and combining tone marks are dropped, so
//! Yoruba text stays readable but loses its diacritics. Any other
//! character outside Latin-1 is written as `?`.

use anyhow::Context;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::path::Path;

use crate::models::{Role, Turn};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode PDF: {0}")]
    Encode(String),
}

/// Page geometry and typography, in PDF points.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub leading: f32,
    /// Vertical gap between consecutive messages.
    pub spacer: f32,
}

impl PageLayout {
    /// US Letter with one-inch margins.
    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            margin: 72.0,
            font_size: 10.0,
            leading: 12.0,
            spacer: 12.0,
        }
    }

    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::letter()
    }
}

#[derive(Debug, Clone, Copy)]
enum Align {
    Left,
    Right,
}

struct Style {
    prefix: &'static str,
    rgb: [f32; 3],
    align: Align,
}

fn style_for(role: Role) -> Style {
    match role {
        Role::User => Style {
            prefix: "You:",
            rgb: [0.0, 0.0, 1.0],
            align: Align::Left,
        },
        Role::Assistant => Style {
            prefix: "Efiko:",
            rgb: [0.0, 0.5, 0.0],
            align: Align::Right,
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportService {
    layout: PageLayout,
}

impl ExportService {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }

    /// Renders `messages` in order. An empty transcript yields one blank page.
    pub fn render(&self, messages: &[Turn]) -> Result<Vec<u8>, ExportError> {
        let pages = self.layout_pages(messages);
        write_document(&self.layout, pages)
    }

    fn layout_pages(&self, messages: &[Turn]) -> Vec<Vec<Operation>> {
        let l = &self.layout;
        let top = l.height - l.margin - l.font_size;
        let bottom = l.margin;

        let mut pages: Vec<Vec<Operation>> = Vec::new();
        let mut ops: Vec<Operation> = Vec::new();
        let mut y = top;

        for (i, turn) in messages.iter().enumerate() {
            let style = style_for(turn.role());
            if i > 0 && y < top {
                y -= l.spacer;
            }
            let text = format!("{} {}", style.prefix, turn.content());
            for line in wrap_text(&text, l.text_width(), l.font_size) {
                if y < bottom {
                    pages.push(std::mem::take(&mut ops));
                    y = top;
                }
                let x = match style.align {
                    Align::Left => l.margin,
                    Align::Right => {
                        l.width - l.margin - text_width(&line, l.font_size)
                    }
                };
                push_line(&mut ops, &line, x, y, l.font_size, style.rgb);
                y -= l.leading;
            }
        }
        pages.push(ops);
        pages
    }
}

fn push_line(ops: &mut Vec<Operation>, line: &str, x: f32, y: f32, size: f32, rgb: [f32; 3]) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(b"F1".to_vec()), Object::Real(size)],
    ));
    ops.push(Operation::new(
        "rg",
        rgb.iter().map(|c| Object::Real(*c)).collect(),
    ));
    ops.push(Operation::new(
        "Td",
        vec![Object::Real(x), Object::Real(y)],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_latin1(line), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn write_document(layout: &PageLayout, pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, ExportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let bytes = content
            .encode()
            .map_err(|e| ExportError::Encode(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(layout.width),
                Object::Real(layout.height),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    Ok(out)
}

/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

fn char_width(c: char, size: f32) -> f32 {
    let units = match fold_to_latin1(c).map(|c| c as u32) {
        None => 0,
        Some(n @ 32..=126) => HELVETICA_WIDTHS[(n - 32) as usize],
        Some(_) => 556,
    };
    units as f32 * size / 1000.0
}

fn text_width(s: &str, size: f32) -> f32 {
    s.chars().map(|c| char_width(c, size)).sum()
}

/// Greedy word wrap. Embedded newlines start a new line; words wider than
/// `max_width` are split across lines.
fn wrap_text(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if text_width(&candidate, size) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(word, size) <= max_width {
                current = word.to_string();
            } else {
                for c in word.chars() {
                    if text_width(&current, size) + char_width(c, size) > max_width
                        && !current.is_empty()
                    {
                        lines.push(std::mem::take(&mut current));
                    }
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }
    lines
}

/// Maps text to single-byte WinAnsi codes after [`fold_to_latin1`];
/// anything still outside Latin-1 becomes `?`.
fn encode_latin1(s: &str) -> Vec<u8> {
    s.chars()
        .filter_map(fold_to_latin1)
        .map(|c| match c as u32 {
            n @ 0x20..=0x7e | n @ 0xa0..=0xff => n as u8,
            _ => b'?',
        })
        .collect()
}

/// Folds letters from the Latin Extended blocks used by Yoruba, Igbo and
/// Hausa onto a Latin-1 base letter. Returns `None` for combining marks.
fn fold_to_latin1(c: char) -> Option<char> {
    let folded = match c {
        '\u{0300}'..='\u{036f}' => return None,
        'ạ' | 'ā' | 'ă' | 'ą' => 'a',
        'Ạ' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'ɓ' => 'b',
        'Ɓ' => 'B',
        'ɗ' => 'd',
        'Ɗ' => 'D',
        'ẹ' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' | 'ɛ' => 'e',
        'Ẹ' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' | 'Ɛ' => 'E',
        'ị' | 'ī' | 'ĭ' | 'į' => 'i',
        'Ị' | 'Ī' | 'Ĭ' | 'Į' => 'I',
        'ƙ' => 'k',
        'Ƙ' => 'K',
        'ḿ' => 'm',
        'Ḿ' => 'M',
        'ń' | 'ǹ' | 'ň' | 'ṅ' | 'ŋ' => 'n',
        'Ń' | 'Ǹ' | 'Ň' | 'Ṅ' | 'Ŋ' => 'N',
        'ọ' | 'ō' | 'ŏ' | 'ő' | 'ɔ' => 'o',
        'Ọ' | 'Ō' | 'Ŏ' | 'Ő' | 'Ɔ' => 'O',
        'ṣ' | 'ś' | 'š' | 'ş' => 's',
        'Ṣ' | 'Ś' | 'Š' | 'Ş' => 'S',
        'ụ' | 'ū' | 'ŭ' | 'ů' | 'ų' => 'u',
        'Ụ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ų' => 'U',
        '\u{2018}' | '\u{2019}' => '\'',
        '\u{201c}' | '\u{201d}' => '"',
        '\u{2013}' | '\u{2014}' => '-',
        other => other,
    };
    Some(folded)
}

/// CLI entry point for `efiko export`: renders a JSON array of turns
/// (`[{"role": "user", "content": "..."}]`) to a PDF file.
pub fn run_export(transcript: &Path, output: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(transcript)
        .with_context(|| format!("Failed to read {}", transcript.display()))?;
    let turns: Vec<Turn> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse transcript {}", transcript.display()))?;

    let pdf = ExportService::default().render(&turns)?;
    std::fs::write(output, &pdf)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Exported {} messages to {} ({} bytes)",
        turns.len(),
        output.display(),
        pdf.len()
    );
    Ok(())
}
