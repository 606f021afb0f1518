use clap::{Parser, Subcommand};
use geo::Rect;
use poi_store::DEFAULT_URL;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// POI Viewer - Clusters points of interest for a map viewport and prints the markers
pub struct Settings {
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// Where to download the POI payload from
    #[clap(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Directory of the cache file (defaults to the per-user cache directory)
    #[clap(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Map zoom level
    #[clap(short, long, default_value = "12", value_parser = clap::value_parser!(u8).range(0..=29))]
    pub zoom: u8,

    /// Viewport as south,west,north,east in degrees
    #[clap(long, value_name = "S,W,N,E", default_value = "55.55,37.35,55.95,37.90")]
    pub bbox: BoundingBox,

    /// Worker threads for decoding and clustering (0 = one per core)
    #[clap(long, default_value = "0")]
    pub workers: usize,

    /// Network timeout in seconds
    #[clap(long, default_value = "30")]
    pub timeout: u64,

    /// Only read the cache, never download
    #[clap(long, default_value = "false")]
    pub offline: bool,

    /// Print markers as JSON
    #[clap(long, default_value = "false")]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pack a text list of points into a cache file
    Pack {
        /// Text file with one `lat,lon[,promoted]` entry per line
        #[clap(value_name = "FILE")]
        input: PathBuf,

        /// Cache file to write
        #[clap(short, long, value_name = "FILE", default_value = "poi.bin")]
        output: PathBuf,
    },
}

impl Settings {
    pub fn from_cli() -> Self {
        Settings::try_parse().unwrap_or_else(|e| e.exit())
    }
}

/// Geographic viewport in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Viewport in normalized world coordinates
    pub fn to_viewport(&self) -> Rect<f64> {
        poi_index::utils::viewport_from_degrees(self.south, self.west, self.north, self.east)
    }
}

impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>().map_err(|e| format!("invalid coordinate '{v}': {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        let &[south, west, north, east] = values.as_slice() else {
            return Err(format!("expected 4 comma-separated values, got {}", values.len()));
        };
        if south > north || west > east {
            return Err("south/west must not exceed north/east".to_string());
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err("coordinates must be finite".to_string());
        }
        Ok(Self {
            south,
            west,
            north,
            east,
        })
    }
}
