//! Configuration images: the device's fuse array as fixed-width rows, and the crbit text form
//! produced by the bitstream compiler.
//!
//! crbit is one fuse row per line written as ASCII `0`/`1`, top row first.  Blank lines and
//! `//` comment lines are ignored.

use std::fmt::Write;

use crate::error::{Error, Result};

/// Rows of fuses, all of the same width.  Row 0 is programmed first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurationImage {
    rows: Vec<Vec<bool>>,
    width: usize,
}

impl ConfigurationImage {
    /// An image of the given size with every fuse cleared
    pub fn blank(rows: usize, width: usize) -> Self {
        Self {
            rows: vec![vec![false; width]; rows],
            width,
        }
    }

    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(Error::ImageGeometry {
                expected_rows: rows.len(),
                expected_width: width,
                rows: rows.len(),
                width: bad.len(),
            });
        }
        Ok(Self { rows, width })
    }

    /// Parse crbit text
    pub fn from_crbit(text: &str) -> Result<Self> {
        let mut rows: Vec<Vec<bool>> = Vec::new();
        for (i, l) in text.lines().enumerate() {
            let l = l.trim();
            if l.is_empty() || l.starts_with("//") {
                continue;
            }

            let row = l
                .chars()
                .map(|c| match c {
                    '0' => Ok(false),
                    '1' => Ok(true),
                    _ => Err(Error::image_parse(i + 1, format!("unexpected character {c:?}"))),
                })
                .collect::<Result<Vec<bool>>>()?;

            if let Some(first) = rows.first() {
                if first.len() != row.len() {
                    return Err(Error::image_parse(
                        i + 1,
                        format!("row is {} fuses wide, expected {}", row.len(), first.len()),
                    ));
                }
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(Error::image_parse(0, "no fuse rows"));
        }
        Self::from_rows(rows)
    }

    /// Parse crbit text and insist on the device geometry
    pub fn from_crbit_checked(text: &str, rows: usize, width: usize) -> Result<Self> {
        let image = Self::from_crbit(text)?;
        image.check_geometry(rows, width)?;
        Ok(image)
    }

    pub fn check_geometry(&self, rows: usize, width: usize) -> Result<()> {
        if self.rows.len() != rows || self.width != width {
            return Err(Error::ImageGeometry {
                expected_rows: rows,
                expected_width: width,
                rows: self.rows.len(),
                width: self.width,
            });
        }
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Get a fuse value at the particular xy coordinate
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.rows[y][x]
    }

    /// Set the fuse value at the particular xy coordinate
    pub fn set(&mut self, x: usize, y: usize, val: bool) {
        self.rows[y][x] = val;
    }

    pub fn to_crbit(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "// crbit native bitstream file written by zia-probe\n");
        for row in &self.rows {
            s.extend(row.iter().map(|&b| if b { '1' } else { '0' }));
            s.push('\n');
        }
        s
    }
}
