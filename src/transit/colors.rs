use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

/// Palette file looked up in the resources directory.
pub const PALETTE_FILE: &str = "transit_colors.json";

/// Color name used when a route has no usable color.
pub const DEFAULT_COLOR: &str = "default";

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("failed to read color palette {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse color palette {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("color {name:?} in {path:?} is not a RRGGBB hex value")]
    BadColor { path: PathBuf, name: String },
}

type Rgb = (u8, u8, u8);

/// Maps GTFS route colors onto the named colors of the transit palette.
#[derive(Debug, Default)]
pub struct ColorPicker {
    palette: Vec<(String, Rgb)>,
}

impl ColorPicker {
    /// Loads [`PALETTE_FILE`] from `resources`, a JSON object of name to
    /// `RRGGBB` hex. A missing file yields an empty palette.
    pub fn load(resources: &Path) -> Result<Self, PaletteError> {
        let path = resources.join(PALETTE_FILE);
        if !path.is_file() {
            warn!(path = %path.display(), "Color palette not found, routes get the default color");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| PaletteError::Read {
            path: path.clone(),
            source,
        })?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&content).map_err(|source| PaletteError::Parse {
                path: path.clone(),
                source,
            })?;

        let mut palette = Vec::with_capacity(entries.len());
        for (name, hex) in entries {
            let Some(rgb) = parse_hex(&hex) else {
                return Err(PaletteError::BadColor { path, name });
            };
            palette.push((name, rgb));
        }

        info!(colors = palette.len(), "Loaded color palette");
        Ok(Self { palette })
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Rgb)>,
        S: Into<String>,
    {
        Self {
            palette: entries.into_iter().map(|(n, c)| (n.into(), c)).collect(),
        }
    }

    /// Returns the palette name nearest to `route_color`, or [`DEFAULT_COLOR`].
    pub fn pick(&self, route_color: Option<&str>) -> String {
        let Some(rgb) = route_color.and_then(parse_hex) else {
            return DEFAULT_COLOR.to_string();
        };

        self.palette
            .iter()
            .min_by_key(|(_, candidate)| distance(rgb, *candidate))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| DEFAULT_COLOR.to_string())
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn distance(a: Rgb, b: Rgb) -> u32 {
    let d = |x: u8, y: u8| (i32::from(x) - i32::from(y)).unsigned_abs().pow(2);
    d(a.0, b.0) + d(a.1, b.1) + d(a.2, b.2)
}
